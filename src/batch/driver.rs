//! Batch loop over dataset samples.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;

use crate::dataset::Sample;
use crate::host::{BodyActors, SceneHost};
use crate::process::{sample_folder_name, DatasetProcessor, SampleOutcome, Workspace};
use crate::util::{Error, Result};
use super::logs::AttemptLog;
use super::state::{AttemptTracker, SampleState, CLEANUP_INTERVAL, MAX_ATTEMPTS};

/// Batch settings.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub samples_dir: PathBuf,
    /// Experiment output root; attempt logs go to the sample folders in it.
    pub output_dir: PathBuf,
    /// Output folders carry the `_with_cache` suffix.
    pub with_cache: bool,
    /// Resume marker: samples sorting before it are skipped.
    pub resume_from: Option<String>,
    /// Process only this sample.
    pub sample_id: Option<String>,
    /// Export only this frame.
    pub frame: Option<usize>,
    /// Console echo of attempt logs; `None` keeps them in the files only.
    pub echo: Option<LevelFilter>,
    pub max_attempts: u32,
    pub cleanup_interval: usize,
}

impl BatchOptions {
    pub fn new(samples_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            samples_dir: samples_dir.into(),
            output_dir: output_dir.into(),
            with_cache: true,
            resume_from: None,
            sample_id: None,
            frame: None,
            echo: Some(LevelFilter::INFO),
            max_attempts: MAX_ATTEMPTS,
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }

    /// Folder receiving the attempt logs of a sample.
    pub fn log_dir(&self, sample: &Sample) -> PathBuf {
        self.output_dir.join(sample_folder_name(sample.stem(), self.with_cache))
    }
}

/// Final state of every attempted sample.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Sample ids in the order they were attempted.
    pub attempted: Vec<String>,
    pub done: Vec<String>,
    /// Finished without exporting anything.
    pub skipped: Vec<String>,
    pub abandoned: Vec<String>,
    /// Attempts spent per sample, in attempt order.
    pub attempts: Vec<u32>,
}

impl BatchReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// List samples in `samples_dir`, sorted by id.
///
/// With `sample_id` only that sample is returned; it must exist as a
/// directory. Both cases are configuration errors when nothing is found.
pub fn discover_samples(samples_dir: &Path, sample_id: Option<&str>) -> Result<Vec<Sample>> {
    if let Some(id) = sample_id {
        let path = samples_dir.join(id);
        if !path.is_dir() {
            return Err(Error::config(format!("sample {} does not exist in {}", id, samples_dir.display())));
        }
        return Ok(vec![Sample::new(id, path)]);
    }

    let entries = fs::read_dir(samples_dir).map_err(|e| {
        Error::config(format!("cannot list samples in {}: {}", samples_dir.display(), e))
    })?;
    let mut samples: Vec<Sample> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| Sample::new(e.file_name().to_string_lossy().into_owned(), e.path()))
        .collect();
    if samples.is_empty() {
        return Err(Error::config(format!("no samples found in {}", samples_dir.display())));
    }
    samples.sort();
    Ok(samples)
}

/// Drop samples sorting strictly before the resume marker.
///
/// `samples` must already be sorted; the marker itself is kept.
pub fn plan_samples(samples: Vec<Sample>, resume_from: Option<&str>) -> Vec<Sample> {
    match resume_from.filter(|m| !m.is_empty()) {
        Some(marker) => samples.into_iter().filter(|s| s.id.as_str() >= marker).collect(),
        None => samples,
    }
}

/// Drives a processor over every planned sample with bounded retries.
pub struct BatchDriver<'a> {
    host: &'a mut dyn SceneHost,
    processor: &'a mut dyn DatasetProcessor,
    options: BatchOptions,
}

impl<'a> BatchDriver<'a> {
    pub fn new(host: &'a mut dyn SceneHost, processor: &'a mut dyn DatasetProcessor, options: BatchOptions) -> Self {
        Self { host, processor, options }
    }

    /// Run the batch. Only discovery and the initial environment setup can
    /// fail; sample failures end up in the report.
    pub fn run(&mut self) -> Result<BatchReport> {
        let samples = discover_samples(&self.options.samples_dir, self.options.sample_id.as_deref())?;
        let planned = if self.options.sample_id.is_some() {
            samples
        } else {
            plan_samples(samples, self.options.resume_from.as_deref())
        };
        tracing::info!(samples = planned.len(), "processing {} data", self.processor.name());

        let mut actors = self.reset_environment()?;
        let mut report = BatchReport::default();

        for (index, sample) in planned.iter().enumerate() {
            if index > 0 && self.options.cleanup_interval > 0 && index % self.options.cleanup_interval == 0 {
                tracing::info!("periodic environment reset after {} samples", index);
                actors = self.reset_environment()?;
            }

            tracing::info!("processing {}", sample.id);
            let (state, outcome) = self.process_sample(sample, actors);

            report.attempted.push(sample.id.clone());
            match state {
                SampleState::Done(n) => {
                    report.attempts.push(n);
                    match outcome {
                        Some(SampleOutcome::Skipped) => report.skipped.push(sample.id.clone()),
                        _ => report.done.push(sample.id.clone()),
                    }
                }
                SampleState::Abandoned(n) => {
                    report.attempts.push(n);
                    tracing::error!("{} abandoned after {} attempts", sample.id, n);
                    report.abandoned.push(sample.id.clone());
                }
                other => {
                    // Trackers always end in a terminal state
                    report.attempts.push(0);
                    tracing::error!("{} left in state {}", sample.id, other);
                    report.abandoned.push(sample.id.clone());
                }
            }
        }

        tracing::info!(
            done = report.done.len(),
            skipped = report.skipped.len(),
            abandoned = report.abandoned.len(),
            "batch finished"
        );
        Ok(report)
    }

    fn reset_environment(&mut self) -> Result<BodyActors> {
        self.host.reset_environment()?;
        self.host.load_body_actors()
    }

    /// Attempt one sample until it succeeds or the budget is spent.
    fn process_sample(&mut self, sample: &Sample, actors: BodyActors) -> (SampleState, Option<SampleOutcome>) {
        let mut tracker = AttemptTracker::new(self.options.max_attempts);
        let folder = self.options.log_dir(sample);
        let frame = self.options.frame;

        while let Some(attempt) = tracker.begin() {
            let log = match AttemptLog::create(&folder, attempt, self.options.echo) {
                Ok(log) => Some(log),
                Err(e) => {
                    tracing::warn!("cannot create attempt logs in {}: {}", folder.display(), e);
                    None
                }
            };

            let host = &mut *self.host;
            let processor = &mut *self.processor;
            let mut run = || {
                let _span = tracing::info_span!("attempt", sample = %sample.id, attempt).entered();
                panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut workspace = Workspace::acquire(host, actors);
                    processor.process_sample(&mut workspace, sample, frame)
                }))
                .unwrap_or_else(|payload| Err(Error::Processing(panic_message(payload))))
            };
            let result = match &log {
                Some(log) => log.scope(run),
                None => run(),
            };

            match result {
                Ok(outcome) => {
                    tracker.succeed();
                    tracing::info!("{}: done on attempt {}", sample.id, attempt);
                    return (tracker.state(), Some(outcome));
                }
                Err(e) => {
                    if let Some(log) = &log {
                        if let Err(write_err) = log.write_failure(&e) {
                            tracing::warn!("cannot write failure log: {}", write_err);
                        }
                    }
                    tracing::debug!("{}", e.report());
                    tracing::warn!("{}: failed, retry {}", sample.id, attempt);
                    tracker.fail();
                }
            }
        }
        (tracker.state(), None)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}
