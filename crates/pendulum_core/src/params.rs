//! Raw pendulum parameters and everything derived from them.
//!
//! A `PendulumConfiguration` is only ever built whole by [`PendulumConfiguration::derive`];
//! there is no way to update a raw input without recomputing every derived field.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Friction, ModelParameters, ModelVariant, PendulumSystem};
use crate::solvers::StepperKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeometryInput {
    pub suspension_x: f32,
    pub suspension_y: f32,
    pub screen_width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentInput {
    pub gravity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BearingInput {
    pub friction_constant: f64,
    pub friction_linear: f64,
    pub friction_quadratic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RodInput {
    pub mass: f64,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BobInput {
    pub mass: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverInput {
    pub initialstep: f64,
    pub maxstep: f64,
    pub abserr: f64,
    pub relerr: f64,
    pub substeps: u32,
    pub adaptive: bool,
    pub stepper: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelInput {
    pub linear: bool,
    pub pointmass: bool,
    pub gyration: bool,
    pub initial_angle: f64,
}

/// Parameters exactly as they appear in a configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawParameters {
    pub geometry: GeometryInput,
    pub environment: EnvironmentInput,
    pub bearing: BearingInput,
    pub rod: RodInput,
    pub bob: BobInput,
    pub solver: SolverInput,
    pub model: ModelInput,
}

impl RawParameters {
    fn numeric_fields(&self) -> [(&'static str, f64); 17] {
        [
            ("geometry.suspension_x", self.geometry.suspension_x as f64),
            ("geometry.suspension_y", self.geometry.suspension_y as f64),
            ("geometry.screen_width", self.geometry.screen_width as f64),
            ("environment.gravity", self.environment.gravity),
            ("bearing.friction_constant", self.bearing.friction_constant),
            ("bearing.friction_linear", self.bearing.friction_linear),
            ("bearing.friction_quadratic", self.bearing.friction_quadratic),
            ("rod.mass", self.rod.mass),
            ("rod.length", self.rod.length),
            ("bob.mass", self.bob.mass),
            ("bob.radius", self.bob.radius),
            ("solver.initialstep", self.solver.initialstep),
            ("solver.maxstep", self.solver.maxstep),
            ("solver.abserr", self.solver.abserr),
            ("solver.relerr", self.solver.relerr),
            ("model.initial_angle", self.model.initial_angle),
            ("solver.substeps", self.solver.substeps as f64),
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in self.numeric_fields() {
            if value.is_nan() {
                return Err(ConfigError::NotANumber { field });
            }
        }
        if self.solver.stepper.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                field: "solver.stepper",
            });
        }
        if self.solver.substeps == 0 {
            return Err(ConfigError::Invalid {
                field: "solver.substeps",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Center-of-mass distances and moments of inertia of one body about the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyInertia {
    pub mass: f64,
    /// Distance from the pivot to the center of mass.
    pub distance: f64,
    /// Radius of gyration, distributed inertia / (mass · distance).
    pub distance_gyration: f64,
    /// Point-mass moment of inertia, mass · distance².
    pub moment_of_inertia: f64,
    pub moment_of_inertia_distributedmass: f64,
}

impl BodyInertia {
    /// Uniform rod hinged at one end.
    pub fn rod(mass: f64, length: f64) -> Self {
        let distance = length / 2.0;
        let distributed = mass * length * length / 3.0;
        Self::from_parts(mass, distance, distributed)
    }

    /// Solid sphere fixed to the end of a rod of length `rod_length`.
    pub fn bob(mass: f64, radius: f64, rod_length: f64) -> Self {
        let distance = rod_length + radius;
        let distributed = mass * radius * radius * 2.0 / 5.0 + mass * distance * distance;
        Self::from_parts(mass, distance, distributed)
    }

    fn from_parts(mass: f64, distance: f64, distributed: f64) -> Self {
        Self {
            mass,
            distance,
            distance_gyration: distributed / mass / distance,
            moment_of_inertia: mass * distance * distance,
            moment_of_inertia_distributedmass: distributed,
        }
    }

    fn inertia(&self, pointmass: bool) -> f64 {
        if pointmass {
            self.moment_of_inertia
        } else {
            self.moment_of_inertia_distributedmass
        }
    }

    fn lever(&self, gyration: bool) -> f64 {
        if gyration {
            self.distance_gyration
        } else {
            self.distance
        }
    }
}

/// Resolved numeric solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub initial_step: f64,
    pub max_step: f64,
    pub abs_err: f64,
    pub rel_err: f64,
    pub substeps: u32,
    pub adaptive: bool,
    pub stepper: StepperKind,
}

/// Renderer-facing geometry. Only passed through; the core never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub suspension_x: f32,
    pub suspension_y: f32,
    pub screen_width: f32,
    /// Rod plus bob radius in normalized screen units.
    pub virtual_rod_length: f32,
    pub transparency: bool,
}

/// The configuration/state record owned by the control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PendulumConfiguration {
    raw: RawParameters,
    rod: BodyInertia,
    bob: BodyInertia,
    variant: ModelVariant,
    model: ModelParameters,
    solver: SolverConfig,
    pub geometry: DisplayGeometry,
    angle: f64,
}

impl PendulumConfiguration {
    /// Derives every quantity from `raw`. Nothing is returned unless all inputs are valid.
    pub fn derive(raw: RawParameters) -> Result<Self, ConfigError> {
        raw.validate()?;
        let stepper: StepperKind = raw.solver.stepper.trim().parse()?;
        let variant = ModelVariant::from_linear_flag(raw.model.linear);

        let rod = BodyInertia::rod(raw.rod.mass, raw.rod.length);
        let bob = BodyInertia::bob(raw.bob.mass, raw.bob.radius, raw.rod.length);

        let moment_of_inertia =
            rod.inertia(raw.model.pointmass) + bob.inertia(raw.model.pointmass);
        if !(moment_of_inertia.is_finite() && moment_of_inertia > 0.0) {
            return Err(ConfigError::NonFiniteDerived {
                quantity: "moment_of_inertia",
            });
        }

        // NOTE: with gyration enabled this mixes the radius of gyration into the gravity
        // torque, which is only an approximation. Kept as is.
        let gravity_torque = raw.environment.gravity
            * (rod.mass * rod.lever(raw.model.gyration) + bob.mass * bob.lever(raw.model.gyration));
        if !gravity_torque.is_finite() {
            return Err(ConfigError::NonFiniteDerived {
                quantity: "gravity_torque",
            });
        }

        let model = ModelParameters {
            moment_of_inertia,
            gravity_torque,
            friction: Friction {
                constant: raw.bearing.friction_constant,
                linear: raw.bearing.friction_linear,
                quadratic: raw.bearing.friction_quadratic,
            },
        };

        let solver = SolverConfig {
            initial_step: raw.solver.initialstep,
            max_step: raw.solver.maxstep,
            abs_err: raw.solver.abserr,
            rel_err: raw.solver.relerr,
            substeps: raw.solver.substeps,
            adaptive: raw.solver.adaptive,
            stepper,
        };

        let geometry = DisplayGeometry {
            suspension_x: raw.geometry.suspension_x,
            suspension_y: raw.geometry.suspension_y,
            screen_width: raw.geometry.screen_width,
            virtual_rod_length: (raw.rod.length + raw.bob.radius) as f32
                / raw.geometry.screen_width
                * 2.0,
            transparency: true,
        };

        debug!(
            "derived configuration: I = {:.6}, G = {:.6}, model {:?}, stepper {:?}",
            moment_of_inertia, gravity_torque, variant, stepper
        );

        Ok(Self {
            variant,
            angle: raw.model.initial_angle,
            raw,
            rod,
            bob,
            model,
            solver,
            geometry,
        })
    }

    /// The right-hand side for the integrator.
    pub fn system(&self) -> PendulumSystem {
        PendulumSystem::new(self.variant, self.model)
    }

    pub fn raw(&self) -> &RawParameters {
        &self.raw
    }

    pub fn rod(&self) -> &BodyInertia {
        &self.rod
    }

    pub fn bob(&self) -> &BodyInertia {
        &self.bob
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn model(&self) -> &ModelParameters {
        &self.model
    }

    pub fn solver(&self) -> &SolverConfig {
        &self.solver
    }

    /// The current angle, the only output the renderer observes.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn initial_angle(&self) -> f64 {
        self.raw.model.initial_angle
    }

    /// Restores the configured initial condition before a new run.
    pub fn reset_angle(&mut self) {
        self.angle = self.raw.model.initial_angle;
    }

    /// Operator adjustment of the starting angle during setup.
    pub fn nudge_angle(&mut self, delta: f64) {
        self.angle += delta;
    }

    pub(crate) fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
    }

    pub fn toggle_transparency(&mut self) {
        self.geometry.transparency = !self.geometry.transparency;
    }

    /// Operator adjustment of the on-screen geometry; the physical rod length is untouched.
    pub fn adjust_geometry(&mut self, rod_length: f32, x: f32, y: f32) {
        self.geometry.virtual_rod_length += rod_length;
        self.geometry.suspension_x += x;
        self.geometry.suspension_y += y;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// The reference pendulum: 1 m, 0.1 kg rod with a 1 kg, 5 cm bob.
    pub(crate) fn reference_raw() -> RawParameters {
        RawParameters {
            geometry: GeometryInput {
                suspension_x: 0.0,
                suspension_y: 0.8,
                screen_width: 0.3,
            },
            environment: EnvironmentInput { gravity: 9.81 },
            bearing: BearingInput {
                friction_constant: 0.0,
                friction_linear: 0.0,
                friction_quadratic: 0.0,
            },
            rod: RodInput {
                mass: 0.1,
                length: 1.0,
            },
            bob: BobInput {
                mass: 1.0,
                radius: 0.05,
            },
            solver: SolverInput {
                initialstep: 1e-3,
                maxstep: 0.01,
                abserr: 1e-8,
                relerr: 1e-8,
                substeps: 10,
                adaptive: true,
                stepper: "rk8pd".to_string(),
            },
            model: ModelInput {
                linear: false,
                pointmass: true,
                gyration: false,
                initial_angle: 0.1,
            },
        }
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T, ConfigError>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn derives_reference_quantities() {
        let conf = PendulumConfiguration::derive(reference_raw()).expect("valid configuration");
        assert_relative_eq!(conf.rod.distance, 0.5);
        assert_relative_eq!(conf.bob.distance, 1.05);
        assert_relative_eq!(conf.rod.moment_of_inertia, 0.025, epsilon = 1e-12);
        assert_relative_eq!(conf.bob.moment_of_inertia, 1.1025, epsilon = 1e-12);
        assert_relative_eq!(
            conf.rod.moment_of_inertia_distributedmass,
            0.1 / 3.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            conf.bob.moment_of_inertia_distributedmass,
            0.05 * 0.05 * 0.4 + 1.1025,
            epsilon = 1e-12
        );
        assert_relative_eq!(conf.model.moment_of_inertia, 1.1275, epsilon = 1e-12);
        assert_relative_eq!(conf.model.gravity_torque, 9.81 * 1.1, epsilon = 1e-12);
        assert_eq!(conf.variant, ModelVariant::Nonlinear);
        assert_eq!(conf.solver.stepper, StepperKind::Rk8pd);
        assert_eq!(conf.angle(), 0.1);
        assert!(conf.geometry.transparency);
        assert_relative_eq!(
            conf.geometry.virtual_rod_length,
            1.05_f32 / 0.3 * 2.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn distributed_mass_and_gyration_flags_switch_formulas() {
        let mut raw = reference_raw();
        raw.model.pointmass = false;
        raw.model.gyration = true;
        let conf = PendulumConfiguration::derive(raw).expect("valid configuration");

        let rod_gyration = (0.1 / 3.0) / 0.1 / 0.5;
        let bob_distributed = 0.05 * 0.05 * 0.4 + 1.1025;
        let bob_gyration = bob_distributed / 1.0 / 1.05;
        assert_relative_eq!(conf.rod.distance_gyration, rod_gyration, epsilon = 1e-12);
        assert_relative_eq!(conf.bob.distance_gyration, bob_gyration, epsilon = 1e-12);
        assert_relative_eq!(
            conf.model.moment_of_inertia,
            0.1 / 3.0 + bob_distributed,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            conf.model.gravity_torque,
            9.81 * (0.1 * rod_gyration + 1.0 * bob_gyration),
            epsilon = 1e-12
        );
    }

    #[test]
    fn inertia_is_positive_for_positive_inputs() {
        for (mass, length, radius) in [(0.01, 0.1, 0.001), (2.0, 3.0, 0.5), (1e-3, 10.0, 1e-4)] {
            for pointmass in [true, false] {
                let mut raw = reference_raw();
                raw.rod.mass = mass;
                raw.rod.length = length;
                raw.bob.mass = mass * 3.0;
                raw.bob.radius = radius;
                raw.model.pointmass = pointmass;
                let conf = PendulumConfiguration::derive(raw).expect("valid configuration");
                assert!(conf.model.moment_of_inertia > 0.0);
            }
        }
    }

    #[test]
    fn derivation_is_idempotent() {
        let first = PendulumConfiguration::derive(reference_raw()).expect("valid configuration");
        let second = PendulumConfiguration::derive(reference_raw()).expect("valid configuration");
        assert_eq!(
            first.model.moment_of_inertia.to_bits(),
            second.model.moment_of_inertia.to_bits()
        );
        assert_eq!(
            first.model.gravity_torque.to_bits(),
            second.model.gravity_torque.to_bits()
        );
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let mut raw = reference_raw();
        raw.environment.gravity = f64::NAN;
        assert_err_contains(PendulumConfiguration::derive(raw), "environment.gravity");

        let mut raw = reference_raw();
        raw.solver.stepper = "euler".to_string();
        assert_err_contains(PendulumConfiguration::derive(raw), "unknown stepper `euler`");

        let mut raw = reference_raw();
        raw.solver.stepper = "  ".to_string();
        assert_err_contains(PendulumConfiguration::derive(raw), "empty string");

        let mut raw = reference_raw();
        raw.solver.substeps = 0;
        assert_err_contains(PendulumConfiguration::derive(raw), "solver.substeps");

        let mut raw = reference_raw();
        raw.bob.mass = 0.0;
        raw.model.gyration = true;
        assert_err_contains(PendulumConfiguration::derive(raw), "gravity_torque");
    }

    #[test]
    fn operator_adjustments_touch_only_transient_fields() {
        let mut conf = PendulumConfiguration::derive(reference_raw()).expect("valid configuration");
        let model = conf.model;
        conf.nudge_angle(0.02);
        conf.nudge_angle(0.02);
        assert_relative_eq!(conf.angle(), 0.14, epsilon = 1e-12);
        conf.toggle_transparency();
        assert!(!conf.geometry.transparency);
        conf.reset_angle();
        assert_eq!(conf.angle(), 0.1);
        assert_eq!(conf.model, model);
    }
}
