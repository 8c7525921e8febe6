//! End-to-end processing of single samples through the headless host.

mod common;

use std::fs;
use std::path::Path;

use humangen::dataset::{MotionConfig, Sample, SubDatasetRegistry};
use humangen::export::Trajectory;
use humangen::host::{HeadlessHost, SceneHost};
use humangen::process::{
    DatasetProcessor, GarmentCaptureProcessor, MotionSequenceProcessor, ProcessorOptions, SampleOutcome, Workspace,
};

use common::{toy_host, toy_regressors, write_garment_sample, write_motion_npz};

fn motion_processor(root: &Path, with_cache: bool) -> MotionSequenceProcessor {
    let samples = root.join("samples");
    let mut options = ProcessorOptions::new(root.join("out"), &samples);
    options.with_cache = with_cache;
    options.seed = Some(3);
    let config = MotionConfig { sub_dataset_id: "CMU".into(), ..Default::default() };
    let registry = SubDatasetRegistry::from_pairs([("CMU", samples)]);
    MotionSequenceProcessor::new(options, config, registry, toy_regressors())
}

fn run_once(host: &mut HeadlessHost, processor: &mut dyn DatasetProcessor, sample: &Sample) -> SampleOutcome {
    let actors = host.load_body_actors().expect("actors");
    let mut ws = Workspace::acquire(host, actors);
    processor.process_sample(&mut ws, sample, None).expect("process sample")
}

#[test]
fn test_motion_sample_without_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let subject = dir.path().join("samples/01");
    fs::create_dir_all(&subject).expect("subject dir");
    write_motion_npz(&subject.join("01_01_poses.npz"), 10, "male");

    let mut processor = motion_processor(dir.path(), false);
    let mut host = toy_host();
    let outcome = run_once(&mut host, &mut processor, &Sample::new("01", &subject));
    assert_eq!(outcome, SampleOutcome::Exported(vec!["01_01_poses".into()]));

    let out = dir.path().join("out/01_01_poses");
    let t = Trajectory::load(out.join("01_01_poses.json")).expect("trajectory");
    assert_eq!(t.bones_shape(), [10, 23, 3]);
    assert_eq!(t.frame, (0..10).collect::<Vec<_>>());
    assert!(t.verts.is_none());
    assert_eq!(t.info["gender"], "male");
    assert_ne!(t.bones[0][17], t.bones[9][17]);

    let caches: Vec<_> = fs::read_dir(out.join("view_cache"))
        .expect("view_cache")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "pc2"))
        .collect();
    assert!(caches.is_empty());
    assert!(out.join("01_01_poses.stl").is_file());
}

#[test]
fn test_cache_hit_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let subject = dir.path().join("samples/01");
    fs::create_dir_all(&subject).expect("subject dir");
    write_motion_npz(&subject.join("01_01_poses.npz"), 6, "female");
    let sample = Sample::new("01", &subject);

    let mut processor = motion_processor(dir.path(), true);
    let mut host = toy_host();

    run_once(&mut host, &mut processor, &sample);
    let cache_path = dir.path().join("out/01_01_poses_with_cache/view_cache/01_01_poses.pc2");
    let first = fs::read(&cache_path).expect("body cache");
    // Rest regression plus one deformation per frame
    assert_eq!(host.deformation_count(), 1 + 6);

    run_once(&mut host, &mut processor, &sample);
    assert_eq!(fs::read(&cache_path).expect("body cache"), first);
    assert_eq!(host.deformation_count(), 1 + 6 + 1);
}

#[test]
fn test_single_frame_garment_sample() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sample = write_garment_sample(&dir.path().join("samples/00007"), 0);

    let mut options = ProcessorOptions::new(dir.path().join("out"), dir.path().join("samples"));
    options.write_verts = true;
    let mut processor = GarmentCaptureProcessor::new(options, toy_regressors());
    let mut host = toy_host();
    run_once(&mut host, &mut processor, &sample);

    let out = dir.path().join("out/00007_with_cache");
    let body = humangen::cache::read_cache(out.join("view_cache/00007.pc2")).expect("body cache");
    assert_eq!(body.frame_count(), 1);
    assert_eq!(body.vertex_count(), 24);

    let t = Trajectory::load(out.join("00007_with_cache.json")).expect("trajectory");
    assert_eq!(t.len(), 1);
    assert_eq!(t.bones_shape(), [1, 23, 3]);
    assert_eq!(t.verts.as_ref().map(|v| v[0].len()), Some(24));

    for garment in ["Tshirt", "Trousers"] {
        let cache = humangen::cache::read_cache(out.join(format!("view_cache/00007_{}.pc2", garment))).expect("garment");
        assert_eq!(cache.frame_count(), 1);
    }
}

#[test]
fn test_workspace_clears_garments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sample = write_garment_sample(&dir.path().join("samples/00008"), 2);

    let options = ProcessorOptions::new(dir.path().join("out"), dir.path().join("samples"));
    let mut processor = GarmentCaptureProcessor::new(options, toy_regressors());
    let mut host = toy_host();
    run_once(&mut host, &mut processor, &sample);

    // Only the two canonical bodies survive the workspace
    assert_eq!(host.object_ids().len(), 2);
}
