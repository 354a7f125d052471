// light.rs — Static light setup: transforms, bounds and culling volume

use xrq_common::q_shared::{
    add_point_to_bounds, box_on_plane_side, clear_bounds, dot_product, matrix_affine_inverse,
    matrix_perspective_projection, matrix_setup_scale, matrix_setup_transform, matrix_transform_point,
    CPlane, Vec3, SIDE_BACK,
};

use crate::model_types::{RefLightType, TrRefLight};

/// Near plane distance of projective lights.
pub const PROJ_NEAR: f32 = 1.0;

fn proj_tangents(light: &TrRefLight) -> (f32, f32) {
    (
        (light.l.fov_x.to_radians() * 0.5).tan(),
        (light.l.fov_y.to_radians() * 0.5).tan(),
    )
}

/// Derives transform, origin, bounds, frustum and matrices from the
/// authored parameters.
pub fn setup_light(light: &mut TrRefLight) {
    light.transform = matrix_setup_transform(&light.l.axis, &light.l.origin);
    light.origin = match light.l.rl_type {
        RefLightType::Omni => matrix_transform_point(&light.transform, &light.l.center),
        RefLightType::Proj => light.l.origin,
    };

    setup_local_bounds(light);
    setup_world_bounds(light);
    setup_frustum(light);

    light.view_matrix = matrix_affine_inverse(&light.transform);
    light.projection_matrix = match light.l.rl_type {
        RefLightType::Omni => {
            let r = light.l.radius.map(|r| if r > 0.0 { 1.0 / r } else { 1.0 });
            matrix_setup_scale(r[0], r[1], r[2])
        }
        RefLightType::Proj => {
            matrix_perspective_projection(light.l.fov_x, light.l.fov_y, PROJ_NEAR, light.l.distance)
        }
    };
}

fn setup_local_bounds(light: &mut TrRefLight) {
    match light.l.rl_type {
        RefLightType::Omni => {
            let r = light.l.radius;
            light.local_bounds = [[-r[0], -r[1], -r[2]], r];
        }
        RefLightType::Proj => {
            let (tx, ty) = proj_tangents(light);
            let far = light.l.distance;
            light.local_bounds = [[PROJ_NEAR.min(far), -far * tx, -far * ty], [far, far * tx, far * ty]];
        }
    }
}

fn setup_world_bounds(light: &mut TrRefLight) {
    let [lo, hi] = light.local_bounds;
    let mut mins = [0.0; 3];
    let mut maxs = [0.0; 3];
    clear_bounds(&mut mins, &mut maxs);
    for i in 0..8 {
        let corner = [
            if i & 1 != 0 { hi[0] } else { lo[0] },
            if i & 2 != 0 { hi[1] } else { lo[1] },
            if i & 4 != 0 { hi[2] } else { lo[2] },
        ];
        let world = matrix_transform_point(&light.transform, &corner);
        add_point_to_bounds(&world, &mut mins, &mut maxs);
    }
    light.world_bounds = [mins, maxs];
}

fn setup_frustum(light: &mut TrRefLight) {
    match light.l.rl_type {
        RefLightType::Omni => {
            let [mins, maxs] = light.world_bounds;
            light.frustum = [
                CPlane::new([1.0, 0.0, 0.0], mins[0]),
                CPlane::new([-1.0, 0.0, 0.0], -maxs[0]),
                CPlane::new([0.0, 1.0, 0.0], mins[1]),
                CPlane::new([0.0, -1.0, 0.0], -maxs[1]),
                CPlane::new([0.0, 0.0, 1.0], mins[2]),
                CPlane::new([0.0, 0.0, -1.0], -maxs[2]),
            ];
        }
        RefLightType::Proj => {
            let (sx, cx) = (light.l.fov_x.to_radians() * 0.5).sin_cos();
            let (sy, cy) = (light.l.fov_y.to_radians() * 0.5).sin_cos();
            // light space: x forward, y left, z up
            let local = [
                ([sx, -cx, 0.0], 0.0),
                ([sx, cx, 0.0], 0.0),
                ([sy, 0.0, -cy], 0.0),
                ([sy, 0.0, cy], 0.0),
                ([1.0, 0.0, 0.0], PROJ_NEAR),
                ([-1.0, 0.0, 0.0], -light.l.distance),
            ];
            let axis = light.l.axis;
            for (plane, (n, d)) in light.frustum.iter_mut().zip(local) {
                let mut normal = [0.0; 3];
                for (j, out) in normal.iter_mut().enumerate() {
                    *out = axis[0][j] * n[0] + axis[1][j] * n[1] + axis[2][j] * n[2];
                }
                *plane = CPlane::new(normal, d + dot_product(&normal, &light.l.origin));
            }
        }
    }
}

/// True when the box lies completely outside the light volume.
pub fn cull_box(light: &TrRefLight, mins: &Vec3, maxs: &Vec3) -> bool {
    light
        .frustum
        .iter()
        .any(|plane| box_on_plane_side(mins, maxs, plane) == SIDE_BACK)
}

fn min_abs(lo: f32, hi: f32) -> f32 {
    if lo <= 0.0 && hi >= 0.0 {
        0.0
    } else {
        lo.abs().min(hi.abs())
    }
}

/// Which of the six shadow cube faces (+x, -x, +y, -y, +z, -z around the
/// light origin) a box can project onto, one bit each.
pub fn cube_side_bits(light: &TrRefLight, bounds: &[Vec3; 2]) -> u8 {
    let mut lo = [0.0; 3];
    let mut hi = [0.0; 3];
    for i in 0..3 {
        lo[i] = bounds[0][i] - light.origin[i];
        hi[i] = bounds[1][i] - light.origin[i];
    }

    let mut bits = 0u8;
    for axis in 0..3 {
        let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
        let reach = min_abs(lo[b], hi[b]).max(min_abs(lo[c], hi[c]));
        if hi[axis] >= reach {
            bits |= 1 << (axis * 2);
        }
        if -lo[axis] >= reach {
            bits |= 1 << (axis * 2 + 1);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use xrq_common::q_shared::matrix_multiply;

    use crate::model_types::RefLight;

    fn omni(origin: Vec3, radius: f32) -> TrRefLight {
        let mut light = TrRefLight::new(RefLight {
            origin,
            radius: [radius; 3],
            ..Default::default()
        });
        setup_light(&mut light);
        light
    }

    #[test]
    fn test_omni_setup() {
        let light = omni([128.0, 0.0, 64.0], 128.0);
        assert_eq!(light.origin, [128.0, 0.0, 64.0]);
        assert_eq!(light.local_bounds, [[-128.0; 3], [128.0; 3]]);
        assert_eq!(light.world_bounds, [[0.0, -128.0, -64.0], [256.0, 128.0, 192.0]]);

        // view * transform is the identity
        let m = matrix_multiply(&light.view_matrix, &light.transform);
        for (i, v) in m.iter().enumerate() {
            let expected = if i % 5 == 0 { 1.0 } else { 0.0 };
            assert_relative_eq!(*v, expected, epsilon = 1e-5);
        }
        assert_relative_eq!(light.projection_matrix[0], 1.0 / 128.0);
    }

    #[test]
    fn test_omni_center_offset() {
        let mut light = TrRefLight::new(RefLight {
            origin: [10.0, 0.0, 0.0],
            center: [0.0, 0.0, 5.0],
            ..Default::default()
        });
        setup_light(&mut light);
        assert_eq!(light.origin, [10.0, 0.0, 5.0]);
    }

    #[test]
    fn test_omni_cull() {
        let light = omni([0.0; 3], 100.0);
        assert!(!cull_box(&light, &[50.0; 3], &[60.0; 3]));
        assert!(!cull_box(&light, &[90.0; 3], &[200.0; 3]));
        assert!(cull_box(&light, &[101.0, 0.0, 0.0], &[120.0, 1.0, 1.0]));
        assert!(cull_box(&light, &[-0.5, -300.0, 0.0], &[0.5, -150.0, 1.0]));
    }

    #[test]
    fn test_projective_setup_and_cull() {
        // looking down +x with a 90 degree cone
        let mut light = TrRefLight::new(RefLight {
            rl_type: RefLightType::Proj,
            distance: 100.0,
            ..Default::default()
        });
        setup_light(&mut light);
        assert_relative_eq!(light.local_bounds[1][0], 100.0);
        assert_relative_eq!(light.local_bounds[1][1], 100.0, epsilon = 1e-3);
        assert_relative_eq!(light.world_bounds[0][1], -100.0, epsilon = 1e-3);

        // in front, inside the cone
        assert!(!cull_box(&light, &[40.0, -1.0, -1.0], &[42.0, 1.0, 1.0]));
        // behind the light
        assert!(cull_box(&light, &[-20.0, -1.0, -1.0], &[-10.0, 1.0, 1.0]));
        // beyond the far plane
        assert!(cull_box(&light, &[110.0, -1.0, -1.0], &[120.0, 1.0, 1.0]));
        // off to the side of the cone but inside the world bounds
        assert!(cull_box(&light, &[10.0, 50.0, -1.0], &[20.0, 60.0, 1.0]));
    }

    #[test]
    fn test_projective_rotated() {
        // forward is +y
        let mut light = TrRefLight::new(RefLight {
            rl_type: RefLightType::Proj,
            origin: [0.0, 0.0, 10.0],
            axis: [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            distance: 50.0,
            ..Default::default()
        });
        setup_light(&mut light);
        assert_eq!(light.origin, [0.0, 0.0, 10.0]);
        assert!(!cull_box(&light, &[-1.0, 20.0, 9.0], &[1.0, 22.0, 11.0]));
        assert!(cull_box(&light, &[20.0, -1.0, 9.0], &[22.0, 1.0, 11.0]));
    }

    #[test]
    fn test_cube_side_bits() {
        let light = omni([128.0, 0.0, 64.0], 300.0);
        // floor quad below the light touches every side except +z
        let bits = cube_side_bits(&light, &[[64.0, -64.0, 0.0], [192.0, 64.0, 0.0]]);
        assert_eq!(bits, 0b10_1111);

        // a box around the light touches all six
        let bits = cube_side_bits(&light, &[[100.0, -10.0, 50.0], [150.0, 10.0, 70.0]]);
        assert_eq!(bits, 0x3f);

        // a small box straight ahead along +x
        let bits = cube_side_bits(&light, &[[200.0, -1.0, 63.0], [201.0, 1.0, 65.0]]);
        assert_eq!(bits, 0b00_0001);
    }
}
