//! Unique display names and skins for AI racers, drawn without replacement.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::RaceError;

pub const RACER_NAMES: [&str; 38] = [
    "Alex", "Jordan", "Riley", "Morgan", "Taylor", "Casey", "Skyler", "Drew", "Jamie", "Cameron",
    "Speedy McZoom", "Nitro Noodle", "Turbo Tornado", "Crash Test Dummy", "Slipstream Sam",
    "Vroom Vroom Von", "Sir Skidsalot", "Screech McSwerve", "Drift Kingpin", "Burnout Barry",
    "Fast & the Fluffy", "Pedal to the Medal", "The Revenger", "Skidmark Steve",
    "Blaze McRaceface", "Spanner Man", "Wheels McGrill", "Fender Bender", "Lap King Larry",
    "Turbo Tuna", "Dom T.", "Ryan OC", "Transporter", "Razor from MW", "BMW lover",
    "Japan enjoyer", "GodZILLA", "DK",
];

/// What happens once every entry of a pool has been handed out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exhaustion {
    /// Return `RaceError::PoolExhausted`
    Fail,
    /// Put every entry back and keep drawing
    Refill,
}

#[derive(Debug, Clone)]
pub struct UniquePool {
    label: &'static str,
    all: Vec<String>,
    available: Vec<String>,
    on_empty: Exhaustion,
}

impl UniquePool {
    pub fn new(label: &'static str, entries: Vec<String>, on_empty: Exhaustion) -> Self {
        Self {
            label,
            available: entries.clone(),
            all: entries,
            on_empty,
        }
    }

    pub fn draw<R: Rng>(&mut self, rng: &mut R) -> Result<String, RaceError> {
        if self.available.is_empty() {
            match self.on_empty {
                Exhaustion::Refill if !self.all.is_empty() => {
                    debug!(pool = self.label, "pool refilled");
                    self.available = self.all.clone();
                }
                _ => return Err(RaceError::PoolExhausted { pool: self.label }),
            }
        }

        let i = rng.gen_range(0..self.available.len());
        Ok(self.available.swap_remove(i))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub skin: String,
}

/// Session-owned name and skin pools
#[derive(Debug)]
pub struct Roster {
    names: UniquePool,
    skins: UniquePool,
    rng: StdRng,
}

impl Roster {
    pub fn new(skins: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            names: UniquePool::new(
                "name",
                RACER_NAMES.iter().map(|s| s.to_string()).collect(),
                Exhaustion::Fail,
            ),
            skins: UniquePool::new("skin", skins, Exhaustion::Refill),
            rng,
        }
    }

    /// Skin only, for racers named outside the pool (players)
    pub fn assign_skin(&mut self) -> Result<String, RaceError> {
        self.skins.draw(&mut self.rng)
    }

    /// Unique name plus a skin for a new AI racer
    pub fn assign(&mut self) -> Result<Identity, RaceError> {
        let name = self.names.draw(&mut self.rng)?;
        let skin = self.skins.draw(&mut self.rng)?;
        Ok(Identity { name, skin })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn skins() -> Vec<String> {
        vec!["red".into(), "blue".into()]
    }

    #[test]
    fn names_are_unique_until_pool_is_exhausted() {
        let mut roster = Roster::new(skins(), Some(42));
        let mut seen = HashSet::new();
        for _ in 0..RACER_NAMES.len() {
            let id = roster.assign().unwrap();
            assert!(seen.insert(id.name));
        }
        assert!(matches!(
            roster.assign(),
            Err(RaceError::PoolExhausted { pool: "name" })
        ));
    }

    #[test]
    fn skins_refill_after_every_skin_is_used() {
        let mut roster = Roster::new(skins(), Some(7));
        let first: HashSet<_> = (0..2).map(|_| roster.assign().unwrap().skin).collect();
        assert_eq!(first.len(), 2);
        assert!(roster.assign().is_ok());
    }

    #[test]
    fn same_seed_same_draws() {
        let mut a = Roster::new(skins(), Some(99));
        let mut b = Roster::new(skins(), Some(99));
        for _ in 0..5 {
            assert_eq!(a.assign().unwrap(), b.assign().unwrap());
        }
    }

    #[test]
    fn empty_skin_pool_fails_even_with_refill() {
        let mut pool = UniquePool::new("skin", Vec::new(), Exhaustion::Refill);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(pool.draw(&mut rng).is_err());
    }
}
