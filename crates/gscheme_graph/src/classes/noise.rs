// SPDX-License-Identifier: MIT OR Apache-2.0
//! Procedural 3D patterns. Every pattern yields values in `[-1, 1]`.

use crate::class::ClassBuilder;
use crate::registry::{ClassRegistryBuilder, RegistryError};
use crate::types::Generator3d;

/// Shape of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Alternating unit cubes
    ChessCubes,
    /// Concentric spheres around the origin
    Spheres,
    /// Concentric cylinders around the Y axis
    Cylinders,
}

/// Native instance of the pattern nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Noise {
    /// Cells per unit
    pub frequency: f32,
}

impl Default for Noise {
    fn default() -> Self {
        Self { frequency: 1.0 }
    }
}

/// Triangle wave over the distance to the origin: 1 on a shell, -1 halfway between shells
fn shells(distance: f64) -> f64 {
    let inner = distance - distance.floor();
    let nearest = inner.min(1.0 - inner);
    1.0 - 4.0 * nearest
}

impl Noise {
    /// Build the generator for `pattern`
    pub fn generator(&self, pattern: Pattern) -> Generator3d {
        let frequency = f64::from(self.frequency);
        match pattern {
            Pattern::ChessCubes => Generator3d::new(move |x, y, z| {
                let cell = |v: f64| ((v * frequency).floor() as i64) & 1;
                if cell(x) ^ cell(y) ^ cell(z) != 0 {
                    -1.0
                } else {
                    1.0
                }
            }),
            Pattern::Spheres => {
                Generator3d::new(move |x, y, z| shells((x * x + y * y + z * z).sqrt() * frequency))
            }
            Pattern::Cylinders => Generator3d::new(move |x, _, z| shells(x.hypot(z) * frequency)),
        }
    }
}

fn define_noise(
    classes: &mut ClassRegistryBuilder,
    name: &str,
    display_name: &str,
    pattern: Pattern,
) -> Result<(), RegistryError> {
    classes.define_class(
        ClassBuilder::<Noise>::new(name)
            .display_name(display_name)
            .embedded("Frequency", |n: &Noise| n.frequency, |n, v| n.frequency = v)
            .output("Result", move |n: &Noise| Ok(n.generator(pattern))),
    )
}

pub(super) fn define_classes(classes: &mut ClassRegistryBuilder) -> Result<(), RegistryError> {
    define_noise(classes, "ChessCubes", "Noise chess cubes", Pattern::ChessCubes)?;
    define_noise(classes, "Spheres", "Noise spheres", Pattern::Spheres)?;
    define_noise(classes, "Cylinders", "Noise cylinders", Pattern::Cylinders)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chess_cubes_alternate() {
        let chess = Noise::default().generator(Pattern::ChessCubes);
        assert_eq!(chess.eval(0.5, 0.5, 0.5), 1.0);
        assert_eq!(chess.eval(1.5, 0.5, 0.5), -1.0);
        assert_eq!(chess.eval(1.5, 1.5, 0.5), 1.0);
        assert_eq!(chess.eval(-0.5, 0.5, 0.5), -1.0);

        let fine = Noise { frequency: 2.0 }.generator(Pattern::ChessCubes);
        assert_eq!(fine.eval(0.75, 0.25, 0.25), -1.0);
    }

    #[test]
    fn test_spheres_range() {
        let spheres = Noise::default().generator(Pattern::Spheres);
        assert_eq!(spheres.eval(0.0, 0.0, 0.0), 1.0);
        assert_eq!(spheres.eval(0.0, 0.5, 0.0), -1.0);
        assert_eq!(spheres.eval(0.0, 0.0, 2.0), 1.0);
        for i in 0..50 {
            let v = spheres.eval(f64::from(i) * 0.037, 0.3, -0.2);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_cylinders_ignore_y() {
        let cylinders = Noise { frequency: 0.5 }.generator(Pattern::Cylinders);
        assert_eq!(cylinders.eval(1.0, 0.0, 0.0), -1.0);
        assert_eq!(cylinders.eval(1.0, 42.0, 0.0), -1.0);
        assert_eq!(cylinders.eval(0.0, 7.0, 2.0), 1.0);
    }
}
