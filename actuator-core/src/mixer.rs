//! Mixer matrix cache and the tilt-rotor row transform.
//!
//! The cache is rebuilt only when mixer settings change; the per-tick hot
//! path is a plain matrix-vector multiply.

use micromath::F32Ext;

use crate::settings::{
    axis, MixerSettings, MixerType, MAX_MIX_ACTUATORS, MIXER_SCALE, MIXER_VECTOR_LEN,
};

/// Row-major mixer matrix (channel x axis) with a parallel row-type array.
pub struct MixerCache {
    matrix: [[f32; MIXER_VECTOR_LEN]; MAX_MIX_ACTUATORS],
    types: [MixerType; MAX_MIX_ACTUATORS],
}

impl MixerCache {
    pub const fn new() -> Self {
        Self {
            matrix: [[0.0; MIXER_VECTOR_LEN]; MAX_MIX_ACTUATORS],
            types: [MixerType::Disabled; MAX_MIX_ACTUATORS],
        }
    }

    /// Build the cache from mixer settings: coefficients rescale by
    /// 1/[`MIXER_SCALE`], rows of non-actuator types are zero-filled, and
    /// motor rows get the tilt transform applied.
    pub fn compute(settings: &MixerSettings) -> Self {
        let mut cache = Self::new();
        let tilt_rad = settings.rotor_tilt_deg.to_radians();

        for (idx, mixer) in settings.mixers.iter().enumerate() {
            cache.types[idx] = mixer.mixer_type;

            if matches!(mixer.mixer_type, MixerType::Motor | MixerType::Servo) {
                for (out, coeff) in cache.matrix[idx].iter_mut().zip(mixer.vector) {
                    *out = coeff as f32 * (1.0 / MIXER_SCALE as f32);
                }
            }

            // Only motors tilt.
            if mixer.mixer_type == MixerType::Motor {
                tilt_transform(&mut cache.matrix[idx], tilt_rad);
            }
        }

        cache
    }

    pub fn mixer_type(&self, channel: usize) -> MixerType {
        self.types[channel]
    }

    pub fn row(&self, channel: usize) -> &[f32; MIXER_VECTOR_LEN] {
        &self.matrix[channel]
    }

    /// `motor_vect = M * desired_vect`.
    pub fn mix(&self, desired: &[f32; MIXER_VECTOR_LEN]) -> [f32; MAX_MIX_ACTUATORS] {
        let mut out = [0.0; MAX_MIX_ACTUATORS];
        for (value, row) in out.iter_mut().zip(&self.matrix) {
            *value = row.iter().zip(desired).map(|(m, d)| m * d).sum();
        }
        out
    }
}

impl Default for MixerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotate a motor row's force/moment contributions by `theta` radians about
/// the body Y axis, modelling a physically tilted rotor.
///
/// The row encodes a thrust force `F` at the rotor position `d` (recovered
/// from the roll/pitch coefficients) plus a yaw torque `tau`. Rotating the
/// moment vector directly would translate the rotor, so instead `F` and
/// `tau` are rotated and the moment recomputed about the rotor position:
/// `M' = d x F' + tau'`. Axes are body-frame, z down.
fn tilt_transform(row: &mut [f32; MIXER_VECTOR_LEN], theta: f32) {
    // Positive thrust coefficient means force along -z (up).
    let thrust_mix = -row[axis::CURVE1];
    if thrust_mix == 0.0 {
        // Pure torque row; no rotor position to rotate about.
        return;
    }

    let force = [0.0, 0.0, -thrust_mix];
    let torque = [0.0, 0.0, row[axis::YAW]];
    // dz is unknowable from the row; multirotor arms sit close to the CG
    // plane, so it is taken as zero.
    let arm = [
        row[axis::PITCH] / thrust_mix,
        -row[axis::ROLL] / thrust_mix,
        0.0,
    ];

    let force_rot = rotate_y(force, theta);
    let torque_rot = rotate_y(torque, theta);
    let cross = [
        arm[1] * force_rot[2] - arm[2] * force_rot[1],
        arm[2] * force_rot[0] - arm[0] * force_rot[2],
        arm[0] * force_rot[1] - arm[1] * force_rot[0],
    ];
    let moment = [
        cross[0] + torque_rot[0],
        cross[1] + torque_rot[1],
        cross[2] + torque_rot[2],
    ];

    row[axis::CURVE1] = force_rot[2];
    row[axis::ROLL] = moment[0];
    row[axis::PITCH] = moment[1];
    row[axis::YAW] = moment[2];
}

fn rotate_y(v: [f32; 3], theta: f32) -> [f32; 3] {
    let (sin, cos) = (theta.sin(), theta.cos());
    [
        v[0] * cos + v[2] * sin,
        v[1],
        -v[0] * sin + v[2] * cos,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Mixer;
    use approx::assert_relative_eq;
    use core::f32::consts::FRAC_PI_2;

    fn motor_row(c1: i16, roll: i16, pitch: i16, yaw: i16) -> Mixer {
        let mut vector = [0i16; MIXER_VECTOR_LEN];
        vector[axis::CURVE1] = c1;
        vector[axis::ROLL] = roll;
        vector[axis::PITCH] = pitch;
        vector[axis::YAW] = yaw;
        Mixer {
            mixer_type: MixerType::Motor,
            vector,
        }
    }

    #[test]
    fn cache_scales_actuator_rows_and_zeroes_the_rest() {
        let mut settings = MixerSettings::default();
        settings.mixers[0] = motor_row(128, 64, -64, 32);
        settings.mixers[1].mixer_type = MixerType::CameraPitch;
        settings.mixers[1].vector = [127; MIXER_VECTOR_LEN];

        let cache = MixerCache::compute(&settings);

        assert_relative_eq!(cache.row(0)[axis::CURVE1], 1.0);
        assert_relative_eq!(cache.row(0)[axis::ROLL], 0.5);
        assert_relative_eq!(cache.row(0)[axis::PITCH], -0.5);
        assert_relative_eq!(cache.row(0)[axis::YAW], 0.25);

        // Camera rows keep their type but mix nothing.
        assert_eq!(cache.mixer_type(1), MixerType::CameraPitch);
        assert!(cache.row(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_tilt_is_identity_on_every_row() {
        let mut settings = MixerSettings::quad_x();
        settings.mixers[1] = motor_row(128, -64, 64, 64);
        settings.rotor_tilt_deg = 0.0;

        let cache = MixerCache::compute(&settings);
        for (idx, mixer) in settings.mixers.iter().enumerate() {
            for (col, coeff) in mixer.vector.iter().enumerate() {
                assert_relative_eq!(
                    cache.row(idx)[col],
                    *coeff as f32 / 128.0,
                    epsilon = 1e-6
                );
            }
        }
    }

    #[test]
    fn tilt_preserves_thrust_magnitude() {
        // The rotated force is (F_x', 0, F_z') with F_z' = c1 cos(theta);
        // its norm must stay |c1| for any tilt angle.
        for angle_deg in [0.0f32, 15.0, 30.0, 45.0, 60.0, 90.0] {
            let mut row = [0.0f32; MIXER_VECTOR_LEN];
            row[axis::CURVE1] = 0.75;
            row[axis::PITCH] = 0.5;
            let theta = angle_deg.to_radians();

            tilt_transform(&mut row, theta);

            assert_relative_eq!(row[axis::CURVE1], 0.75 * theta.cos(), epsilon = 1e-6);
            let f_x = 0.75 * theta.sin();
            let norm = (row[axis::CURVE1] * row[axis::CURVE1] + f_x * f_x).sqrt();
            assert_relative_eq!(norm, 0.75, epsilon = 1e-5);
        }
    }

    #[test]
    fn quarter_turn_tilt_degenerates_to_zero_authority() {
        // A motor tilted fully horizontal contributes neither vertical
        // thrust nor any attitude moment.
        let mut row = [0.0f32; MIXER_VECTOR_LEN];
        row[axis::CURVE1] = 1.0;
        row[axis::PITCH] = 1.0;

        tilt_transform(&mut row, FRAC_PI_2);

        assert_relative_eq!(row[axis::CURVE1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(row[axis::ROLL], 0.0, epsilon = 1e-6);
        assert_relative_eq!(row[axis::PITCH], 0.0, epsilon = 1e-6);
        assert_relative_eq!(row[axis::YAW], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn pure_torque_rows_skip_the_transform() {
        let mut row = [0.0f32; MIXER_VECTOR_LEN];
        row[axis::YAW] = 0.5;
        let before = row;

        tilt_transform(&mut row, FRAC_PI_2);
        assert_eq!(row, before);
    }

    #[test]
    fn mix_is_the_matrix_vector_product() {
        let settings = MixerSettings::quad_x();
        let cache = MixerCache::compute(&settings);

        let mut desired = [0.0f32; MIXER_VECTOR_LEN];
        desired[axis::CURVE1] = 0.5;
        desired[axis::ROLL] = 0.2;

        let out = cache.mix(&desired);
        assert_relative_eq!(out[0], 0.5 + 0.2 * 0.5, epsilon = 1e-6);
        assert_relative_eq!(out[1], 0.5 - 0.2 * 0.5, epsilon = 1e-6);
        assert_relative_eq!(out[2], 0.5 - 0.2 * 0.5, epsilon = 1e-6);
        assert_relative_eq!(out[3], 0.5 + 0.2 * 0.5, epsilon = 1e-6);
        // Unconfigured rows mix to nothing.
        assert!(out[4..].iter().all(|&v| v == 0.0));
    }
}
