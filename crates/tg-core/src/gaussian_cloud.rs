use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::debug;
use crate::bounding_box::BoundingBox;
use crate::error::{Error, Result};

/// Zeroth-order spherical harmonic constant used to turn `f_dc` into color
const SH_C0: f32 = 0.282_094_8;

const END_HEADER: &[u8] = b"end_header\n";

const PROPERTY_NAMES: [&str; FLOATS_PER_SPLAT] = [
    "x", "y", "z",
    "f_dc_0", "f_dc_1", "f_dc_2",
    "opacity",
    "scale_0", "scale_1", "scale_2",
    "rot_0", "rot_1", "rot_2", "rot_3",
];

const FLOATS_PER_SPLAT: usize = 14;
const SPLAT_STRIDE: usize = FLOATS_PER_SPLAT * 4;

/// One Gaussian as laid out in the decoded PLY body
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Splat {
    pub position: [f32; 3],
    pub f_dc: [f32; 3],
    pub opacity: f32,
    pub scale: [f32; 3],
    /// Quaternion, w first
    pub rotation: [f32; 4],
}

impl Splat {
    /// Base color in 0..=255 derived from the DC harmonic
    pub fn color(&self) -> [u8; 3] {
        self.f_dc.map(|c| ((0.5 + SH_C0 * c).clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianCloud {
    pub splats: Vec<Splat>,
    pub count: usize,
}

impl GaussianCloud {
    pub fn new(splats: Vec<Splat>) -> Self {
        let count = splats.len();
        Self { splats, count }
    }

    pub fn from_ply(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_ply_bytes(&data)
    }

    /// Parses a binary little-endian PLY holding 14 floats per vertex
    pub fn from_ply_bytes(data: &[u8]) -> Result<Self> {
        let header_end = data
            .windows(END_HEADER.len())
            .position(|w| w == END_HEADER)
            .ok_or_else(|| Error::Header("no end_header line".into()))?;

        let header = std::str::from_utf8(&data[..header_end])
            .map_err(|_| Error::Header("header is not ASCII".into()))?;
        let count = parse_header(header)?;

        let body = &data[header_end + END_HEADER.len()..];
        let expected = count
            .checked_mul(SPLAT_STRIDE)
            .ok_or_else(|| Error::Header(format!("vertex count {count} is out of range")))?;
        if body.len() < expected {
            return Err(Error::Truncated { count, expected, actual: body.len() });
        }

        let splats: Vec<Splat> = body[..expected]
            .chunks_exact(SPLAT_STRIDE)
            .map(|chunk| {
                let values: [f32; FLOATS_PER_SPLAT] = std::array::from_fn(|i| {
                    let at = i * 4;
                    f32::from_le_bytes([chunk[at], chunk[at + 1], chunk[at + 2], chunk[at + 3]])
                });
                bytemuck::cast(values)
            })
            .collect();

        debug!("parsed {} splats from {} byte PLY", splats.len(), data.len());

        Ok(Self::new(splats))
    }

    /// Serializes back into the same PLY layout `from_ply_bytes` reads
    pub fn to_ply_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.splats.len() * SPLAT_STRIDE);

        let _ = write!(
            out,
            "ply\nformat binary_little_endian 1.0\nelement vertex {}\n",
            self.splats.len()
        );
        for name in PROPERTY_NAMES {
            let _ = writeln!(out, "property float {name}");
        }
        out.extend_from_slice(END_HEADER);

        for splat in &self.splats {
            let values: [f32; FLOATS_PER_SPLAT] = bytemuck::cast(*splat);
            for v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }

        out
    }

    /// Vertex-colored point mesh: positions plus the splats' base colors
    pub fn to_point_mesh_ply_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.splats.len() * 15);

        let _ = write!(
            out,
            "ply\nformat binary_little_endian 1.0\nelement vertex {}\n\
             property float x\nproperty float y\nproperty float z\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\n",
            self.splats.len()
        );
        out.extend_from_slice(END_HEADER);

        for splat in &self.splats {
            for v in splat.position {
                out.extend_from_slice(&v.to_le_bytes());
            }
            out.extend_from_slice(&splat.color());
        }

        out
    }

    /// Keeps the first splat in each `voxel_size` cube
    pub fn decimated(&self, voxel_size: f32) -> Self {
        if voxel_size <= 0.0 || !voxel_size.is_finite() {
            return self.clone();
        }

        let mut occupied = HashSet::new();
        let splats = self
            .splats
            .iter()
            .filter(|s| {
                let cell = (Vec3::from_array(s.position) / voxel_size).floor().as_ivec3();
                occupied.insert(cell.to_array())
            })
            .copied()
            .collect();

        Self::new(splats)
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.splats.iter().map(|s| Vec3::from_array(s.position))
    }

    pub fn bounds(&self) -> Result<BoundingBox> {
        BoundingBox::from_points(self.positions()).ok_or(Error::Empty)
    }
}

fn parse_header(header: &str) -> Result<usize> {
    let mut lines = header.lines().map(str::trim);

    if lines.next() != Some("ply") {
        return Err(Error::Header("missing ply magic".into()));
    }

    let mut count = None;
    let mut properties = 0;
    let mut in_vertex = false;

    for line in lines {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("format") => {
                let format = parts.next().unwrap_or_default();
                if format != "binary_little_endian" {
                    return Err(Error::Format(format!("format {format}")));
                }
            }
            Some("element") => {
                let name = parts.next().unwrap_or_default();
                if name != "vertex" {
                    return Err(Error::Format(format!("element {name}")));
                }
                let n = parts
                    .next()
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| Error::Header(format!("bad vertex count in `{line}`")))?;
                count = Some(n);
                in_vertex = true;
            }
            Some("property") if in_vertex => {
                let ty = parts.next().unwrap_or_default();
                if ty != "float" && ty != "float32" {
                    return Err(Error::Format(format!("property type {ty}")));
                }
                properties += 1;
            }
            Some("comment") | Some("obj_info") | None => {}
            Some(other) => return Err(Error::Header(format!("unexpected `{other}`"))),
        }
    }

    if properties != FLOATS_PER_SPLAT {
        return Err(Error::Format(format!(
            "{properties} vertex properties, expected {FLOATS_PER_SPLAT}"
        )));
    }

    count.ok_or_else(|| Error::Header("no vertex element".into()))
}
