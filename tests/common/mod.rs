//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use humangen::cache::{write_cache, VertexCache};
use humangen::dataset::Sample;
use humangen::host::{BodyModel, HeadlessHost};
use humangen::pose::{Gender, JointRegressor, NUM_JOINTS, NUM_POSE_BLENDSHAPES, NUM_SHAPE_COEFFS};
use humangen::process::JointRegressors;
use humangen::util::{DVec3, Vec3};
use ndarray::{Array1, Array2, Array3};
use ndarray_npy::WriteNpyExt;
use serde_json::json;

/// One vertex per joint, stacked along Y, rigidly bound to its joint.
pub fn toy_model(gender: Gender) -> BodyModel {
    let template: Vec<DVec3> = (0..NUM_JOINTS).map(|j| DVec3::new(0.0, j as f64 * 0.1, 0.0)).collect();
    let mut shape_dirs = Array3::zeros((NUM_JOINTS, 3, NUM_SHAPE_COEFFS));
    for v in 0..NUM_JOINTS {
        shape_dirs[[v, 2, 0]] = 1.0;
    }
    let pose_dirs = Array3::zeros((NUM_JOINTS, 3, NUM_POSE_BLENDSHAPES));
    let regressor = JointRegressor::new(Array2::eye(NUM_JOINTS)).expect("regressor");
    BodyModel::new(gender, template, shape_dirs, pose_dirs, regressor, Array2::eye(NUM_JOINTS), vec![[0, 1, 2]])
        .expect("toy model")
}

pub fn toy_host() -> HeadlessHost {
    HeadlessHost::new(toy_model(Gender::Male), toy_model(Gender::Female))
}

pub fn toy_regressors() -> JointRegressors {
    let r = JointRegressor::new(Array2::eye(NUM_JOINTS)).expect("regressor");
    JointRegressors::new(r.clone(), r)
}

/// Version 1 `.npy` payload of a unicode string scalar.
fn npy_string(value: &str) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '<U{}', 'fortran_order': False, 'shape': (), }}",
        value.chars().count()
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut out = b"\x93NUMPY\x01\x00".to_vec();
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend(value.chars().flat_map(|c| (c as u32).to_le_bytes()));
    out
}

/// AMASS-style archive with `frames` frames of a slow arm raise.
pub fn write_motion_npz(path: &Path, frames: usize, gender: &str) {
    let file = fs::File::create(path).expect("create npz");
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let poses = Array2::<f64>::from_shape_fn((frames, 156), |(f, i)| {
        if i == 2 {
            0.3
        } else if i == 16 * 3 + 2 {
            0.05 * f as f64
        } else {
            0.0
        }
    });
    let trans = Array2::<f64>::from_shape_fn((frames, 3), |(f, c)| if c == 0 { f as f64 * 0.01 } else { 0.0 });
    let betas = Array1::<f64>::from_iter((0..16).map(|i| if i == 0 { 0.2 } else { 0.0 }));
    let dmpls = Array2::<f64>::zeros((frames, 8));

    zip.start_file("poses.npy", opts).expect("poses");
    poses.write_npy(&mut zip).expect("poses");
    zip.start_file("trans.npy", opts).expect("trans");
    trans.write_npy(&mut zip).expect("trans");
    zip.start_file("betas.npy", opts).expect("betas");
    betas.write_npy(&mut zip).expect("betas");
    zip.start_file("dmpls.npy", opts).expect("dmpls");
    dmpls.write_npy(&mut zip).expect("dmpls");
    zip.start_file("gender.npy", opts).expect("gender");
    zip.write_all(&npy_string(gender)).expect("gender");
    zip.finish().expect("finish npz");
}

/// Garment capture sample with a T-shirt and trousers; `frames == 0`
/// writes a single-frame record.
pub fn write_garment_sample(dir: &Path, frames: usize) -> Sample {
    fs::create_dir_all(dir).expect("sample dir");
    let (poses, trans) = if frames == 0 {
        (json!(vec![0.0; 72]), json!([0.0, 0.0, 0.0]))
    } else {
        (
            json!(vec![vec![0.0; frames]; 72]),
            json!((0..3).map(|c| (0..frames).map(|f| if c == 0 { f as f64 } else { 0.0 }).collect::<Vec<_>>()).collect::<Vec<_>>()),
        )
    };
    let info = json!({
        "poses": poses,
        "trans": trans,
        "shape": vec![0.0; 10],
        "gender": true,
        "zrot": 0.0,
        "outfit": {
            "Tshirt": {"texture": {"type": "color", "data": [0.8, 0.1, 0.1]}},
            "Trousers": {"texture": {"type": "color", "data": [0.1, 0.1, 0.8]}}
        }
    });
    fs::write(dir.join("info.json"), serde_json::to_vec(&info).expect("json")).expect("info.json");

    for garment in ["Tshirt", "Trousers"] {
        fs::write(dir.join(format!("{}.obj", garment)), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").expect("obj");
        let source = VertexCache::from_frames(&vec![vec![Vec3::ZERO; 3]; frames.max(1)]).expect("cache");
        write_cache(dir.join(format!("{}.pc2", garment)), &source).expect("pc2");
    }

    let id = dir.file_name().expect("sample id").to_string_lossy().into_owned();
    Sample::new(id, dir)
}
