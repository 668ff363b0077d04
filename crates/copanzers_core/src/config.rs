//! Simulation configuration.
//!
//! Configuration is plain data, loaded from RON and validated once before
//! the simulation starts. Validation failure is the only fatal error the
//! core produces.
//!
//! # Example RON
//!
//! ```ron
//! SimConfig(
//!     arena: Arena(width: 800.0, height: 600.0),
//!     tick_duration: 0.016666666,
//!     friendly_fire: false,
//!     weapons: {
//!         "cannon": WeaponSpec(
//!             damage: 30,
//!             cooldown_ticks: 45,
//!             projectile_speed: 240.0,
//!             max_ticks: Some(180),
//!         ),
//!     },
//! )
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{ArmorClass, Falloff, Shape};
use crate::error::ConfigError;
use crate::math::{decimal_serde, option_decimal_serde, Fixed, Vec2Fixed};

/// Default tick rate in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Name of the weapon used when none is specified.
pub const DEFAULT_WEAPON: &str = "cannon";

/// Bounded rectangular play area `[0, width] × [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arena {
    /// Width in world units.
    #[serde(with = "decimal_serde")]
    pub width: Fixed,
    /// Height in world units.
    #[serde(with = "decimal_serde")]
    pub height: Fixed,
}

impl Arena {
    /// Create an arena of the given size.
    #[must_use]
    pub const fn new(width: Fixed, height: Fixed) -> Self {
        Self { width, height }
    }

    /// Whether a point lies inside the arena (edges included).
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        point.x >= Fixed::ZERO
            && point.y >= Fixed::ZERO
            && point.x <= self.width
            && point.y <= self.height
    }

    /// Clamp a center point so a circle of `radius` stays fully inside.
    ///
    /// When the circle is larger than the arena along an axis, the center is
    /// pinned to the middle of that axis.
    #[must_use]
    pub fn clamp_circle(&self, center: Vec2Fixed, radius: Fixed) -> Vec2Fixed {
        let clamp_axis = |value: Fixed, extent: Fixed| {
            let lo = radius;
            let hi = extent - radius;
            if lo > hi {
                extent / Fixed::from_num(2)
            } else {
                value.clamp(lo, hi)
            }
        };
        Vec2Fixed::new(
            clamp_axis(center.x, self.width),
            clamp_axis(center.y, self.height),
        )
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(Fixed::from_num(800), Fixed::from_num(600))
    }
}

/// Largest weapon damage accepted; damage is scaled in fixed point.
pub const MAX_WEAPON_DAMAGE: u32 = i32::MAX as u32;

/// One row of the weapon table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeaponSpec {
    /// Damage on direct hit / at blast center.
    pub damage: u32,
    /// Ticks the tank must wait after firing.
    pub cooldown_ticks: u32,
    /// Splash radius (0 = direct hit only).
    #[serde(default, with = "decimal_serde")]
    pub blast_radius: Fixed,
    /// Splash falloff curve.
    #[serde(default)]
    pub falloff: Falloff,
    /// Projectile speed in units per second.
    #[serde(with = "decimal_serde")]
    pub projectile_speed: Fixed,
    /// Projectile collision radius.
    #[serde(default = "default_projectile_radius", with = "decimal_serde")]
    pub projectile_radius: Fixed,
    /// Lifetime in ticks (`None` = unlimited).
    #[serde(default)]
    pub max_ticks: Option<u32>,
    /// Travel distance budget (`None` = unlimited).
    #[serde(default, with = "option_decimal_serde")]
    pub max_range: Option<Fixed>,
}

fn default_projectile_radius() -> Fixed {
    Fixed::ONE
}

impl WeaponSpec {
    /// A direct-fire cannon.
    #[must_use]
    pub fn cannon() -> Self {
        Self {
            damage: 30,
            cooldown_ticks: 45,
            blast_radius: Fixed::ZERO,
            falloff: Falloff::Linear,
            projectile_speed: Fixed::from_num(240),
            projectile_radius: Fixed::ONE,
            max_ticks: Some(180),
            max_range: None,
        }
    }

    /// A slow splash mortar.
    #[must_use]
    pub fn mortar() -> Self {
        Self {
            damage: 50,
            cooldown_ticks: 120,
            blast_radius: Fixed::from_num(40),
            falloff: Falloff::Linear,
            projectile_speed: Fixed::from_num(150),
            projectile_radius: Fixed::from_num(2),
            max_ticks: None,
            max_range: Some(Fixed::from_num(300)),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidWeapon {
            weapon: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("weapon name must not be empty"));
        }
        if self.damage == 0 {
            return Err(invalid("damage must be positive"));
        }
        if self.damage > MAX_WEAPON_DAMAGE {
            return Err(invalid("damage is too large"));
        }
        if self.projectile_speed <= Fixed::ZERO {
            return Err(invalid("projectile speed must be positive"));
        }
        if self.projectile_radius <= Fixed::ZERO {
            return Err(invalid("projectile radius must be positive"));
        }
        if self.blast_radius < Fixed::ZERO {
            return Err(invalid("blast radius must not be negative"));
        }
        if self.max_ticks == Some(0) {
            return Err(invalid("max_ticks must be positive when set"));
        }
        if matches!(self.max_range, Some(range) if range <= Fixed::ZERO) {
            return Err(invalid("max_range must be positive when set"));
        }
        Ok(())
    }
}

/// Defaults applied to every spawned tank unless the spawn overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TankDefaults {
    /// Maximum health.
    pub max_health: u32,
    /// Armor class.
    #[serde(default)]
    pub armor: ArmorClass,
    /// Hull collision radius.
    #[serde(with = "decimal_serde")]
    pub radius: Fixed,
    /// Top speed in units per second.
    #[serde(with = "decimal_serde")]
    pub max_speed: Fixed,
    /// Top turn rate in radians per second.
    #[serde(with = "decimal_serde")]
    pub max_turn_rate: Fixed,
    /// Acceleration in units/s² (`None` = instant).
    #[serde(default, with = "option_decimal_serde")]
    pub acceleration: Option<Fixed>,
    /// Weapon equipped by default.
    #[serde(default = "default_weapon_name")]
    pub weapon: String,
}

fn default_weapon_name() -> String {
    DEFAULT_WEAPON.to_string()
}

impl TankDefaults {
    /// Hull shape for spawned tanks.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        Shape::circle(self.radius)
    }
}

impl Default for TankDefaults {
    fn default() -> Self {
        Self {
            max_health: 100,
            armor: ArmorClass::Light,
            radius: Fixed::from_num(10),
            max_speed: Fixed::from_num(60),
            max_turn_rate: Fixed::from_num(3),
            acceleration: None,
            weapon: default_weapon_name(),
        }
    }
}

/// Optional rule making tank-tank collisions deal damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RamDamageRule {
    /// Damage per unit of closing speed along the contact normal.
    #[serde(with = "decimal_serde")]
    pub damage_per_speed: Fixed,
    /// Closing speeds at or below this deal no damage.
    #[serde(default, with = "decimal_serde")]
    pub min_closing_speed: Fixed,
}

/// Complete simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimConfig {
    /// Play area.
    #[serde(default)]
    pub arena: Arena,
    /// Fixed logical timestep in seconds.
    #[serde(default = "default_tick_duration", with = "decimal_serde")]
    pub tick_duration: Fixed,
    /// Whether projectiles damage tanks of the firing team.
    #[serde(default)]
    pub friendly_fire: bool,
    /// Tank-tank collision damage (`None` = collisions never damage).
    #[serde(default)]
    pub ram_damage: Option<RamDamageRule>,
    /// Weapon table keyed by weapon name.
    #[serde(default = "default_weapons")]
    pub weapons: BTreeMap<String, WeaponSpec>,
    /// Per-tank defaults.
    #[serde(default)]
    pub tanks: TankDefaults,
    /// Spatial index cell size in world units.
    #[serde(default = "default_cell_size", with = "decimal_serde")]
    pub spatial_cell_size: Fixed,
    /// Ticks executed within one frame before the scheduler reports lag.
    #[serde(default = "default_lag_threshold")]
    pub lag_warning_ticks: u32,
}

fn default_tick_duration() -> Fixed {
    Fixed::ONE / Fixed::from_num(DEFAULT_TICK_RATE)
}

fn default_cell_size() -> Fixed {
    Fixed::from_num(64)
}

const fn default_lag_threshold() -> u32 {
    5
}

fn default_weapons() -> BTreeMap<String, WeaponSpec> {
    let mut weapons = BTreeMap::new();
    weapons.insert(DEFAULT_WEAPON.to_string(), WeaponSpec::cannon());
    weapons.insert("mortar".to_string(), WeaponSpec::mortar());
    weapons
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena: Arena::default(),
            tick_duration: default_tick_duration(),
            friendly_fire: false,
            ram_damage: None,
            weapons: default_weapons(),
            tanks: TankDefaults::default(),
            spatial_cell_size: default_cell_size(),
            lag_warning_ticks: default_lag_threshold(),
        }
    }
}

impl SimConfig {
    /// Parse a configuration from RON text and validate it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Look up a weapon by name.
    #[must_use]
    pub fn weapon(&self, name: &str) -> Option<&WeaponSpec> {
        self.weapons.get(name)
    }

    /// Check every invariant the simulation relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_duration <= Fixed::ZERO {
            return Err(ConfigError::NonPositiveTickDuration);
        }
        if self.arena.width <= Fixed::ZERO || self.arena.height <= Fixed::ZERO {
            return Err(ConfigError::InvalidArena {
                width: self.arena.width.to_string(),
                height: self.arena.height.to_string(),
            });
        }
        if self.spatial_cell_size <= Fixed::ZERO {
            return Err(ConfigError::InvalidCellSize);
        }
        if self.weapons.is_empty() {
            return Err(ConfigError::EmptyWeaponTable);
        }
        for (name, weapon) in &self.weapons {
            weapon.validate(name)?;
        }

        let tanks = &self.tanks;
        if tanks.max_health == 0 {
            return Err(ConfigError::InvalidTankDefaults(
                "max_health must be positive".into(),
            ));
        }
        if tanks.radius <= Fixed::ZERO {
            return Err(ConfigError::InvalidTankDefaults(
                "radius must be positive".into(),
            ));
        }
        if tanks.max_speed < Fixed::ZERO || tanks.max_turn_rate < Fixed::ZERO {
            return Err(ConfigError::InvalidTankDefaults(
                "speed limits must not be negative".into(),
            ));
        }
        if matches!(tanks.acceleration, Some(accel) if accel <= Fixed::ZERO) {
            return Err(ConfigError::InvalidTankDefaults(
                "acceleration must be positive when set".into(),
            ));
        }
        if !self.weapons.contains_key(&tanks.weapon) {
            return Err(ConfigError::UnknownWeapon(tanks.weapon.clone()));
        }

        if let Some(rule) = self.ram_damage {
            if rule.damage_per_speed < Fixed::ZERO || rule.min_closing_speed < Fixed::ZERO {
                return Err(ConfigError::InvalidRamRule(
                    "values must not be negative".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_tick_duration_rejected() {
        let config = SimConfig {
            tick_duration: Fixed::ZERO,
            ..SimConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveTickDuration));

        let negative = SimConfig {
            tick_duration: Fixed::from_num(-1),
            ..SimConfig::default()
        };
        assert_eq!(
            negative.validate(),
            Err(ConfigError::NonPositiveTickDuration)
        );
    }

    #[test]
    fn test_malformed_weapon_rejected() {
        let mut config = SimConfig::default();
        config.weapons.insert(
            "dud".into(),
            WeaponSpec {
                projectile_speed: Fixed::ZERO,
                ..WeaponSpec::cannon()
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeapon { weapon, .. }) if weapon == "dud"
        ));
    }

    #[test]
    fn test_oversized_damage_rejected() {
        let mut config = SimConfig::default();
        if let Some(mortar) = config.weapons.get_mut("mortar") {
            mortar.damage = 3_000_000_000;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeapon { weapon, .. }) if weapon == "mortar"
        ));

        config.weapons.get_mut("mortar").unwrap().damage = MAX_WEAPON_DAMAGE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_default_weapon_rejected() {
        let mut config = SimConfig::default();
        config.tanks.weapon = "railgun".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownWeapon("railgun".into()))
        );
    }

    #[test]
    fn test_parse_ron_with_decimals() {
        let text = r#"
            SimConfig(
                arena: Arena(width: 400.0, height: 300.0),
                tick_duration: 0.05,
                friendly_fire: true,
                weapons: {
                    "cannon": WeaponSpec(
                        damage: 30,
                        cooldown_ticks: 10,
                        projectile_speed: 100.0,
                        max_ticks: Some(20),
                    ),
                },
            )
        "#;
        let config = SimConfig::from_ron_str(text).unwrap();
        assert_eq!(config.arena.width, Fixed::from_num(400));
        assert!(config.friendly_fire);
        assert_eq!(config.weapon("cannon").unwrap().damage, 30);
        assert_eq!(
            config.weapon("cannon").unwrap().projectile_radius,
            Fixed::ONE
        );
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = SimConfig::from_ron_str("SimConfig(tick_duration: \"fast\")").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_ron_roundtrip_keeps_values() {
        let config = SimConfig::default();
        let text = config.to_ron_string().unwrap();
        let parsed = SimConfig::from_ron_str(&text).unwrap();
        assert_eq!(parsed.weapons, config.weapons);
        assert_eq!(parsed.arena, config.arena);
    }

    #[test]
    fn test_clamp_circle_keeps_radius_inside() {
        let arena = Arena::new(Fixed::from_num(100), Fixed::from_num(50));
        let clamped = arena.clamp_circle(Vec2Fixed::from_ints(-5, 70), Fixed::from_num(10));
        assert_eq!(clamped, Vec2Fixed::from_ints(10, 40));
        assert!(arena.contains(clamped));
    }
}
