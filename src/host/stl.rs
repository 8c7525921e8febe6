//! Binary STL and OBJ mesh writers used by the headless host.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::util::{Result, Vec3};

/// Mesh borrowed for writing: positions plus triangle indices.
pub(crate) struct MeshRef<'a> {
    pub positions: &'a [Vec3],
    pub faces: &'a [[u32; 3]],
}

impl MeshRef<'_> {
    /// Corners of `face`, or `None` when an index is past the positions.
    fn corners(&self, face: &[u32; 3]) -> Option<[Vec3; 3]> {
        let [a, b, c] = face.map(|i| self.positions.get(i as usize).copied());
        Some([a?, b?, c?])
    }

    fn valid_faces(&self) -> impl Iterator<Item = &[u32; 3]> {
        self.faces.iter().filter(|f| f.iter().all(|&i| (i as usize) < self.positions.len()))
    }
}

/// Write several meshes into one binary STL file.
///
/// Faces indexing past their mesh's positions are dropped with a warning.
pub(crate) fn write_stl(path: &Path, meshes: &[MeshRef<'_>]) -> Result<()> {
    let total: usize = meshes.iter().map(|m| m.faces.len()).sum();
    let count: usize = meshes.iter().map(|m| m.valid_faces().count()).sum();
    if count < total {
        tracing::warn!(dropped = total - count, "faces out of range for {}", path.display());
    }

    let mut w = BufWriter::new(File::create(path)?);
    let mut header = [0u8; 80];
    let tag = b"humangen snapshot";
    header[..tag.len()].copy_from_slice(tag);
    w.write_all(&header)?;
    w.write_u32::<LittleEndian>(count as u32)?;

    for mesh in meshes {
        for [a, b, c] in mesh.faces.iter().filter_map(|f| mesh.corners(f)) {
            let normal = (b - a).cross(c - a).normalize_or_zero();
            for v in [normal, a, b, c] {
                w.write_f32::<LittleEndian>(v.x)?;
                w.write_f32::<LittleEndian>(v.y)?;
                w.write_f32::<LittleEndian>(v.z)?;
            }
            w.write_u16::<LittleEndian>(0)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Write a single mesh as Wavefront OBJ.
pub(crate) fn write_obj(path: &Path, name: &str, mesh: &MeshRef<'_>) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "o {}", name)?;
    for v in mesh.positions {
        writeln!(w, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for f in mesh.valid_faces() {
        writeln!(w, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
    }
    w.flush()?;
    Ok(())
}

/// Vertex count and triangles of an OBJ file.
#[derive(Debug, Default)]
pub(crate) struct ObjTopology {
    pub vertex_count: usize,
    pub faces: Vec<[u32; 3]>,
}

/// Read `v` and `f` records. Polygons are fan-triangulated; negative
/// indices count back from the last vertex read so far.
pub(crate) fn parse_obj(text: &str) -> ObjTopology {
    let mut topo = ObjTopology::default();
    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => topo.vertex_count += 1,
            Some("f") => {
                let corners: Vec<u32> = tokens
                    .filter_map(|t| t.split('/').next()?.parse::<i64>().ok())
                    .filter_map(|i| match i {
                        i if i > 0 => u32::try_from(i - 1).ok(),
                        i if i < 0 => u32::try_from(topo.vertex_count as i64 + i).ok(),
                        _ => None,
                    })
                    .collect();
                for k in 1..corners.len().saturating_sub(1) {
                    topo.faces.push([corners[0], corners[k], corners[k + 1]]);
                }
            }
            _ => {}
        }
    }
    topo
}
