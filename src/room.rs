// room.rs — 房间几何: 盒子尺寸、UV 表、透视相机
//
// Scene coordinates follow image rows: +y points down (floor at +hh,
// ceiling at -hh), +z points toward the viewer. The back wall sits at -hd.

use crate::atlas::Face;
#[cfg(test)]
use glam::Vec4;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// The tunable "look" of the room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomLook {
    /// Room height relative to the viewport's short edge.
    pub height_factor: f32,
    /// Room depth relative to the viewport's short edge.
    pub depth_factor: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for RoomLook {
    fn default() -> Self {
        Self {
            height_factor: 1.25,
            depth_factor: 1.60,
            fov_y_degrees: 60.0,
            near: 1.0,
            far: 5000.0,
        }
    }
}

impl RoomLook {
    pub fn fov_y(&self) -> f32 {
        self.fov_y_degrees.to_radians()
    }

    /// Reset out-of-range fields to their defaults. Returns the names of the
    /// fields that were replaced.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let d = Self::default();
        let mut fixed = Vec::new();
        let positive = |x: f32| x.is_finite() && x > 0.0;

        if !positive(self.height_factor) {
            self.height_factor = d.height_factor;
            fixed.push("height_factor");
        }
        if !positive(self.depth_factor) {
            self.depth_factor = d.depth_factor;
            fixed.push("depth_factor");
        }
        if !(positive(self.fov_y_degrees) && self.fov_y_degrees < 180.0) {
            self.fov_y_degrees = d.fov_y_degrees;
            fixed.push("fov_y_degrees");
        }
        // near/far only make sense as a pair
        if !(positive(self.near) && self.far.is_finite() && self.near < self.far) {
            self.near = d.near;
            self.far = d.far;
            fixed.push("near/far");
        }
        fixed
    }
}

/// Atlas-normalized rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

const THIRD: f32 = 1.0 / 3.0;
const TWO_THIRDS: f32 = 2.0 / 3.0;

/// Face -> atlas cell, indexed by `Face::index`.
pub const UV_MAP: [UvRect; 5] = [
    // back
    UvRect { u0: THIRD, v0: THIRD, u1: TWO_THIRDS, v1: TWO_THIRDS },
    // ceiling
    UvRect { u0: THIRD, v0: 0.0, u1: TWO_THIRDS, v1: THIRD },
    // floor
    UvRect { u0: THIRD, v0: TWO_THIRDS, u1: TWO_THIRDS, v1: 1.0 },
    // left
    UvRect { u0: 0.0, v0: THIRD, u1: THIRD, v1: TWO_THIRDS },
    // right
    UvRect { u0: TWO_THIRDS, v0: THIRD, u1: 1.0, v1: TWO_THIRDS },
];

pub fn uv_rect(face: Face) -> UvRect {
    UV_MAP[face.index()]
}

/// Half-extents of the box, recomputed every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomBox {
    pub hw: f32,
    pub hh: f32,
    pub hd: f32,
}

impl RoomBox {
    /// `None` for an empty viewport or an unusable source aspect.
    pub fn from_viewport(viewport: (u32, u32), source_aspect: f32, look: &RoomLook) -> Option<Self> {
        let (vw, vh) = viewport;
        if vw == 0 || vh == 0 || !source_aspect.is_finite() || source_aspect <= 0.0 {
            return None;
        }

        let s = vw.min(vh) as f32;
        let room_h = s * look.height_factor;
        // 背墙宽高比 = 源图宽高比, 不拉伸
        let room_w = room_h * source_aspect;
        let room_d = s * look.depth_factor;

        Some(Self {
            hw: room_w * 0.5,
            hh: room_h * 0.5,
            hd: room_d * 0.5,
        })
    }

    pub fn width(&self) -> f32 {
        self.hw * 2.0
    }

    pub fn height(&self) -> f32 {
        self.hh * 2.0
    }

    pub fn depth(&self) -> f32 {
        self.hd * 2.0
    }
}

/// Distance that makes the vertical field of view span exactly the viewport height.
pub fn camera_distance(viewport_h: f32, fov_y: f32) -> f32 {
    (viewport_h * 0.5) / (fov_y * 0.5).tan()
}

#[derive(Debug, Clone, Copy)]
pub struct RoomCamera {
    pub eye: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
}

impl RoomCamera {
    pub fn new(viewport: (u32, u32), look: &RoomLook) -> Option<Self> {
        let (vw, vh) = viewport;
        if vw == 0 || vh == 0 {
            return None;
        }

        let fov = look.fov_y();
        let eye = Vec3::new(0.0, 0.0, camera_distance(vh as f32, fov));
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(fov, vw as f32 / vh as f32, look.near, look.far);

        Some(Self { eye, view, proj })
    }

    /// Clip-space transform. Scene +y is down, so clip y is flipped.
    pub fn view_proj(&self) -> Mat4 {
        Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * self.proj * self.view
    }

    /// World point -> viewport pixels (origin top-left). `None` behind the camera.
    #[cfg(test)]
    pub fn project(&self, p: Vec3, viewport: (u32, u32)) -> Option<(f32, f32)> {
        let clip = self.view_proj() * Vec4::new(p.x, p.y, p.z, 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some((
            (ndc.x * 0.5 + 0.5) * viewport.0 as f32,
            (0.5 - ndc.y * 0.5) * viewport.1 as f32,
        ))
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RoomVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

fn v(x: f32, y: f32, z: f32, u: f32, v: f32) -> RoomVertex {
    RoomVertex { position: [x, y, z], uv: [u, v] }
}

/// Two triangles per quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

pub const ROOM_VERTEX_COUNT: usize = 4 * Face::ALL.len();
pub const ROOM_INDEX_COUNT: usize = QUAD_INDICES.len() * Face::ALL.len();

/// The four corners of one wall.
///
/// Floor and ceiling keep V fixed at their seam row, the side walls keep U
/// fixed at their seam column, so depth carries no texture gradient.
pub fn face_quad(face: Face, b: &RoomBox) -> [RoomVertex; 4] {
    let RoomBox { hw, hh, hd } = *b;
    let uv = uv_rect(face);

    match face {
        Face::Back => [
            v(-hw, -hh, -hd, uv.u0, uv.v0),
            v(hw, -hh, -hd, uv.u1, uv.v0),
            v(hw, hh, -hd, uv.u1, uv.v1),
            v(-hw, hh, -hd, uv.u0, uv.v1),
        ],
        Face::Floor => [
            v(-hw, hh, hd, uv.u0, uv.v1),
            v(hw, hh, hd, uv.u1, uv.v1),
            v(hw, hh, -hd, uv.u1, uv.v1),
            v(-hw, hh, -hd, uv.u0, uv.v1),
        ],
        Face::Ceiling => [
            v(-hw, -hh, -hd, uv.u0, uv.v0),
            v(hw, -hh, -hd, uv.u1, uv.v0),
            v(hw, -hh, hd, uv.u1, uv.v0),
            v(-hw, -hh, hd, uv.u0, uv.v0),
        ],
        Face::Left => [
            v(-hw, -hh, hd, uv.u0, uv.v0),
            v(-hw, -hh, -hd, uv.u0, uv.v0),
            v(-hw, hh, -hd, uv.u0, uv.v1),
            v(-hw, hh, hd, uv.u0, uv.v1),
        ],
        Face::Right => [
            v(hw, -hh, -hd, uv.u1, uv.v0),
            v(hw, -hh, hd, uv.u1, uv.v0),
            v(hw, hh, hd, uv.u1, uv.v1),
            v(hw, hh, -hd, uv.u1, uv.v1),
        ],
    }
}

#[derive(Debug, Clone)]
pub struct RoomMesh {
    pub vertices: Vec<RoomVertex>,
    pub indices: Vec<u16>,
}

/// Emission order: back, floor, ceiling, left, right.
const EMIT_ORDER: [Face; 5] = [Face::Back, Face::Floor, Face::Ceiling, Face::Left, Face::Right];

pub fn build_room_mesh(b: &RoomBox) -> RoomMesh {
    let mut vertices = Vec::with_capacity(ROOM_VERTEX_COUNT);
    let mut indices = Vec::with_capacity(ROOM_INDEX_COUNT);

    for face in EMIT_ORDER {
        let base = vertices.len() as u16;
        vertices.extend_from_slice(&face_quad(face, b));
        indices.extend(QUAD_INDICES.iter().map(|i| base + i));
    }

    RoomMesh { vertices, indices }
}

/// Everything the GPU needs to draw one frame of the room.
#[derive(Debug, Clone)]
pub struct RoomScene {
    pub room: RoomBox,
    pub camera: RoomCamera,
    pub mesh: RoomMesh,
}

impl RoomScene {
    pub fn build(viewport: (u32, u32), source_aspect: f32, look: &RoomLook) -> Option<Self> {
        let room = RoomBox::from_viewport(viewport, source_aspect, look)?;
        let camera = RoomCamera::new(viewport, look)?;

        // 参数越界时矩阵会变成 inf/NaN, 这一帧直接跳过
        let box_ok = [room.hw, room.hh, room.hd].iter().all(|x| x.is_finite() && *x > 0.0);
        if !box_ok || !camera.eye.is_finite() || !camera.view_proj().is_finite() {
            log::debug!("room look {:?} gives no usable scene", look);
            return None;
        }

        Some(Self {
            room,
            camera,
            mesh: build_room_mesh(&room),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn quad_normal(q: &[RoomVertex; 4]) -> Vec3 {
        let p: Vec<Vec3> = q.iter().map(|v| Vec3::from(v.position)).collect();
        (p[1] - p[0]).cross(p[2] - p[0])
    }

    #[test]
    fn test_full_hd_scenario() {
        let look = RoomLook::default();
        let room = RoomBox::from_viewport((1920, 1080), 4.0 / 3.0, &look).unwrap();
        assert!((room.height() - 1350.0).abs() < EPS);
        assert!((room.depth() - 1728.0).abs() < EPS);
        assert!((room.width() - 1800.0).abs() < EPS);

        let cam = RoomCamera::new((1920, 1080), &look).unwrap();
        assert!((cam.eye.z - 935.307).abs() < 0.01, "camZ = {}", cam.eye.z);
        assert_eq!((cam.eye.x, cam.eye.y), (0.0, 0.0));
    }

    #[test]
    fn test_back_wall_keeps_source_aspect() {
        let look = RoomLook::default();
        for &viewport in &[(1920, 1080), (800, 1200), (640, 640)] {
            for &aspect in &[0.5f32, 0.75, 1.0, 4.0 / 3.0, 16.0 / 9.0, 2.35] {
                let scene = RoomScene::build(viewport, aspect, &look).unwrap();
                let q = face_quad(Face::Back, &scene.room);
                let tl = scene.camera.project(Vec3::from(q[0].position), viewport).unwrap();
                let br = scene.camera.project(Vec3::from(q[2].position), viewport).unwrap();
                let rendered = (br.0 - tl.0) / (br.1 - tl.1);
                assert!(
                    (rendered - aspect).abs() < 1e-3,
                    "viewport {:?} aspect {} rendered {}",
                    viewport,
                    aspect,
                    rendered
                );
            }
        }
    }

    #[test]
    fn test_ceiling_projects_above_floor() {
        let look = RoomLook::default();
        let scene = RoomScene::build((1280, 720), 1.5, &look).unwrap();
        let ceil = scene.camera.project(Vec3::new(0.0, -scene.room.hh, -scene.room.hd), (1280, 720)).unwrap();
        let floor = scene.camera.project(Vec3::new(0.0, scene.room.hh, -scene.room.hd), (1280, 720)).unwrap();
        assert!(ceil.1 < floor.1);

        let left = scene.camera.project(Vec3::new(-scene.room.hw, 0.0, -scene.room.hd), (1280, 720)).unwrap();
        assert!(left.0 < 640.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        let look = RoomLook::default();
        assert!(RoomBox::from_viewport((0, 1080), 1.0, &look).is_none());
        assert!(RoomBox::from_viewport((1920, 0), 1.0, &look).is_none());
        assert!(RoomBox::from_viewport((1920, 1080), 0.0, &look).is_none());
        assert!(RoomBox::from_viewport((1920, 1080), -1.0, &look).is_none());
        assert!(RoomBox::from_viewport((1920, 1080), f32::NAN, &look).is_none());
        assert!(RoomBox::from_viewport((1920, 1080), f32::INFINITY, &look).is_none());
        assert!(RoomCamera::new((0, 0), &look).is_none());
    }

    #[test]
    fn test_out_of_range_look_builds_no_scene() {
        let zero_fov = RoomLook {
            fov_y_degrees: 0.0,
            ..RoomLook::default()
        };
        assert!(RoomScene::build((1280, 720), 1.5, &zero_fov).is_none());

        let negative_height = RoomLook {
            height_factor: -1.0,
            ..RoomLook::default()
        };
        assert!(RoomScene::build((1280, 720), 1.5, &negative_height).is_none());

        let mut look = RoomLook {
            fov_y_degrees: 0.0,
            height_factor: -1.0,
            ..RoomLook::default()
        };
        assert_eq!(look.sanitize(), vec!["height_factor", "fov_y_degrees"]);
        let scene = RoomScene::build((1280, 720), 1.5, &look).unwrap();
        assert!(scene.room.hh > 0.0);
        assert!(scene.camera.view_proj().is_finite());
        assert!(RoomLook::default().sanitize().is_empty());
    }

    #[test]
    fn test_uv_map_tiles_distinct_thirds() {
        for (i, a) in UV_MAP.iter().enumerate() {
            assert!((a.u1 - a.u0 - THIRD).abs() < 1e-6);
            assert!((a.v1 - a.v0 - THIRD).abs() < 1e-6);
            // aligned to the grid
            for x in [a.u0, a.v0] {
                let k = x * 3.0;
                assert!((k - k.round()).abs() < 1e-5);
            }
            for b in UV_MAP.iter().skip(i + 1) {
                let overlap_u = a.u0.max(b.u0) < a.u1.min(b.u1) - 1e-6;
                let overlap_v = a.v0.max(b.v0) < a.v1.min(b.v1) - 1e-6;
                assert!(!(overlap_u && overlap_v), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_uv_map_matches_atlas_cells() {
        for face in Face::ALL {
            let (col, row) = face.cell();
            let uv = uv_rect(face);
            assert!((uv.u0 - col as f32 / 3.0).abs() < 1e-6);
            assert!((uv.v0 - row as f32 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_depth_faces_have_no_gradient() {
        let room = RoomBox { hw: 400.0, hh: 300.0, hd: 500.0 };

        let floor = face_quad(Face::Floor, &room);
        assert!(floor.iter().all(|v| v.uv[1] == uv_rect(Face::Floor).v1));
        let ceil = face_quad(Face::Ceiling, &room);
        assert!(ceil.iter().all(|v| v.uv[1] == uv_rect(Face::Ceiling).v0));
        let left = face_quad(Face::Left, &room);
        assert!(left.iter().all(|v| v.uv[0] == uv_rect(Face::Left).u0));
        let right = face_quad(Face::Right, &room);
        assert!(right.iter().all(|v| v.uv[0] == uv_rect(Face::Right).u1));

        // the back wall spans its whole cell
        let back = face_quad(Face::Back, &room);
        let uv = uv_rect(Face::Back);
        assert_eq!(back[0].uv, [uv.u0, uv.v0]);
        assert_eq!(back[2].uv, [uv.u1, uv.v1]);
    }

    #[test]
    fn test_quads_are_planar_and_axis_aligned() {
        let room = RoomBox { hw: 400.0, hh: 300.0, hd: 500.0 };
        let expected_axis = [
            (Face::Back, Vec3::Z),
            (Face::Floor, Vec3::Y),
            (Face::Ceiling, Vec3::Y),
            (Face::Left, Vec3::X),
            (Face::Right, Vec3::X),
        ];
        for (face, axis) in expected_axis {
            let q = face_quad(face, &room);
            let n = quad_normal(&q).normalize();
            assert!((n.dot(axis).abs() - 1.0).abs() < EPS, "{:?} normal {:?}", face, n);

            // second triangle winds the same way as the first
            let p: Vec<Vec3> = q.iter().map(|v| Vec3::from(v.position)).collect();
            let n2 = (p[2] - p[0]).cross(p[3] - p[0]).normalize();
            assert!((n.dot(n2) - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_mesh_layout() {
        let mesh = build_room_mesh(&RoomBox { hw: 1.0, hh: 1.0, hd: 1.0 });
        assert_eq!(mesh.vertices.len(), ROOM_VERTEX_COUNT);
        assert_eq!(mesh.indices.len(), ROOM_INDEX_COUNT);
        assert_eq!(&mesh.indices[6..12], &[4, 5, 6, 4, 6, 7]);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < ROOM_VERTEX_COUNT));
    }
}
