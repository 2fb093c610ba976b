//! Cube geometry shared by every point, marker and batch.
//!
//! Every visible element is the same unit cube: eight corners at ±1 on each
//! axis, twelve triangles, flat colored. A [`CubeMesh`] is built once per
//! color and shared by reference afterwards.
//!
//! # Transform order
//!
//! [`point_model`] is the single place that places a cube in the scene:
//! scale by `size * POINT_SCALE`, then translate to `position - CENTER_OFFSET`.
//! Baking and live drawing both go through it, so a point looks identical
//! before and after it is baked.

use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::error::ConfigError;

/// A position in attractor space.
pub type Point3 = Vec3;

/// Number of vertices in one cube (6 faces × 2 triangles × 3 vertices).
pub const CUBE_VERTEX_COUNT: usize = 36;

/// World-space half-extent of a cube with size 1.
pub const POINT_SCALE: f32 = 0.0025;

/// Subtracted from every position so the unit-cube scene is centered on the
/// rotation axis.
pub const CENTER_OFFSET: Vec3 = Vec3::splat(0.5);

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#RRGGBB` string.
    pub fn from_hex(text: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidColor(text.to_string());
        let digits = text.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Channels normalized to 0.0-1.0.
    pub fn to_f32(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }
}

/// One cube vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CubeVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl CubeVertex {
    /// This vertex with its position moved by `model`; color is unchanged.
    #[inline]
    pub fn transformed(&self, model: &Mat4) -> Self {
        let p = model.transform_point3(Vec3::from(self.position));
        Self {
            position: p.to_array(),
            color: self.color,
        }
    }
}

/// A shared, immutable 36-vertex cube in a single color.
#[derive(Debug, Clone)]
pub struct CubeMesh {
    color: Rgb,
    vertices: Arc<[CubeVertex]>,
}

impl CubeMesh {
    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn vertices(&self) -> &[CubeVertex] {
        &self.vertices
    }

    /// Whether two handles point at the same built mesh.
    pub fn same_mesh(&self, other: &CubeMesh) -> bool {
        Arc::ptr_eq(&self.vertices, &other.vertices)
    }
}

// (outward normal, u, v) with u × v = normal, so corners walked
// (-1,-1) → (1,-1) → (1,1) → (-1,1) in (u, v) wind counter-clockwise
// when seen from outside.
const FACES: [[[f32; 3]; 3]; 6] = [
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    [[-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
    [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]],
    [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
    [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    [[0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
];

const QUAD: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
const QUAD_TRIANGLES: [usize; 6] = [0, 1, 2, 0, 2, 3];

/// Build a unit cube (corners at ±1) with counter-clockwise outward winding,
/// every vertex carrying `color`.
pub fn build_cube(color: Rgb) -> CubeMesh {
    let rgb = color.to_f32();
    let mut vertices = Vec::with_capacity(CUBE_VERTEX_COUNT);

    for [normal, u, v] in FACES {
        let (n, u, v) = (Vec3::from(normal), Vec3::from(u), Vec3::from(v));
        for &corner in &QUAD_TRIANGLES {
            let (s, t) = QUAD[corner];
            vertices.push(CubeVertex {
                position: (n + u * s + v * t).to_array(),
                color: rgb,
            });
        }
    }

    CubeMesh {
        color,
        vertices: vertices.into(),
    }
}

/// Model matrix placing a cube of `size` at `position`.
#[inline]
pub fn point_model(position: Point3, size: f32) -> Mat4 {
    Mat4::from_translation(position - CENTER_OFFSET) * Mat4::from_scale(Vec3::splat(size * POINT_SCALE))
}

/// Builds each color's cube once and hands out shared copies.
#[derive(Debug, Default)]
pub struct MeshCache {
    meshes: HashMap<Rgb, CubeMesh>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, color: Rgb) -> CubeMesh {
        self.meshes
            .entry(color)
            .or_insert_with(|| build_cube(color))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// The three meshes a scene draws with.
#[derive(Debug, Clone)]
pub struct SceneMeshes {
    /// Generated points, in the configured color.
    pub point: CubeMesh,
    /// Attractor markers.
    pub attractor: CubeMesh,
    /// Current-position marker.
    pub current: CubeMesh,
}

impl SceneMeshes {
    pub fn new(cache: &mut MeshCache, point_color: Rgb) -> Self {
        Self {
            point: cache.get(point_color),
            attractor: cache.get(Rgb::WHITE),
            current: cache.get(Rgb::BLACK),
        }
    }
}
