use std::{
    fmt::{self, Display, Formatter},
    ops::{Index, IndexMut},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

mod error;
pub use error::SuperpopError;

/// Tolerance used when checking that a proportion vector sums to one.
pub const PROPORTION_TOLERANCE: f64 = 1e-6;

/// The five continental superpopulations. The set is closed, so every
/// population-keyed table in the inference engine is a fixed-size array
/// indexed by this enum rather than a string-keyed map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Superpop {
    Eur,
    Afr,
    Eas,
    Sas,
    Amr,
}

impl Superpop {
    pub const COUNT: usize = 5;
    pub const ALL: [Self; Self::COUNT] = [Self::Eur, Self::Afr, Self::Eas, Self::Sas, Self::Amr];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Eur => 0,
            Self::Afr => 1,
            Self::Eas => 2,
            Self::Sas => 3,
            Self::Amr => 4,
        }
    }

    /// Inverse of [`Superpop::index`].
    ///
    /// # Errors
    /// if `index` is not within 0..5.
    pub fn from_index(index: usize) -> Result<Self, SuperpopError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(SuperpopError::InvalidIndex(index))
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Eur => "EUR",
            Self::Afr => "AFR",
            Self::Eas => "EAS",
            Self::Sas => "SAS",
            Self::Amr => "AMR",
        }
    }
}

impl FromStr for Superpop {
    type Err = SuperpopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Self::Eur),
            "AFR" => Ok(Self::Afr),
            "EAS" => Ok(Self::Eas),
            "SAS" => Ok(Self::Sas),
            "AMR" => Ok(Self::Amr),
            _     => Err(SuperpopError::ParseSuperpop(s.to_string())),
        }
    }
}

impl Display for Superpop {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A value per continental superpopulation, stored contiguously and
/// indexed by [`Superpop`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SuperpopMap<T>([T; Superpop::COUNT]);

impl<T> SuperpopMap<T> {
    #[must_use]
    pub fn new(values: [T; Superpop::COUNT]) -> Self {
        Self(values)
    }

    pub fn from_fn(mut f: impl FnMut(Superpop) -> T) -> Self {
        Self(Superpop::ALL.map(&mut f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Superpop, &T)> {
        Superpop::ALL.iter().copied().zip(self.0.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Superpop, &T) -> U) -> SuperpopMap<U> {
        SuperpopMap(Superpop::ALL.map(|pop| f(pop, &self.0[pop.index()])))
    }

    #[must_use]
    pub fn as_array(&self) -> &[T; Superpop::COUNT] {
        &self.0
    }
}

impl<T: Copy> SuperpopMap<T> {
    #[must_use]
    pub fn splat(value: T) -> Self {
        Self([value; Superpop::COUNT])
    }
}

impl SuperpopMap<f64> {
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// The superpopulation holding the largest value. Ties resolve to the
    /// first population in [`Superpop::ALL`] order.
    #[must_use]
    pub fn argmax(&self) -> Superpop {
        let mut best = Superpop::Eur;
        for pop in Superpop::ALL {
            if self.0[pop.index()] > self.0[best.index()] {
                best = pop;
            }
        }
        best
    }
}

impl<T> Index<Superpop> for SuperpopMap<T> {
    type Output = T;

    fn index(&self, pop: Superpop) -> &Self::Output {
        &self.0[pop.index()]
    }
}

impl<T> IndexMut<Superpop> for SuperpopMap<T> {
    fn index_mut(&mut self, pop: Superpop) -> &mut Self::Output {
        &mut self.0[pop.index()]
    }
}

/// Serde shadow: population-keyed tables serialise as the five-field JSON
/// object mandated by the reference file formats.
#[derive(Serialize)]
struct SuperpopFieldsRef<'a, T> {
    #[serde(rename = "EUR")] eur: &'a T,
    #[serde(rename = "AFR")] afr: &'a T,
    #[serde(rename = "EAS")] eas: &'a T,
    #[serde(rename = "SAS")] sas: &'a T,
    #[serde(rename = "AMR")] amr: &'a T,
}

#[derive(Deserialize)]
struct SuperpopFields<T> {
    #[serde(rename = "EUR")] eur: T,
    #[serde(rename = "AFR")] afr: T,
    #[serde(rename = "EAS")] eas: T,
    #[serde(rename = "SAS")] sas: T,
    #[serde(rename = "AMR")] amr: T,
}

impl<T: Serialize> Serialize for SuperpopMap<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SuperpopFieldsRef {
            eur: &self[Superpop::Eur],
            afr: &self[Superpop::Afr],
            eas: &self[Superpop::Eas],
            sas: &self[Superpop::Sas],
            amr: &self[Superpop::Amr],
        }
        .serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for SuperpopMap<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = SuperpopFields::deserialize(deserializer)?;
        Ok(Self([fields.eur, fields.afr, fields.eas, fields.sas, fields.amr]))
    }
}

/// A probability distribution over the five superpopulations: components
/// in [0, 1], summing to one within [`PROPORTION_TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SuperpopMap<f64>", into = "SuperpopMap<f64>")]
pub struct Proportions(SuperpopMap<f64>);

impl Proportions {
    /// Validate a raw map as a probability distribution.
    ///
    /// # Errors
    /// if any component lies outside [0, 1] or the sum strays from 1 by
    /// more than [`PROPORTION_TOLERANCE`].
    pub fn try_new(map: SuperpopMap<f64>) -> Result<Self, SuperpopError> {
        if map.values().any(|value| !(0.0..=1.0).contains(value)) {
            return Err(SuperpopError::ComponentOutOfRange);
        }
        let sum = map.sum();
        if (sum - 1.0).abs() > PROPORTION_TOLERANCE {
            return Err(SuperpopError::DoesNotSumToOne(sum));
        }
        Ok(Self(map))
    }

    /// Rescale an arbitrary non-negative map into a distribution.
    ///
    /// # Errors
    /// if the sum of the map is zero, negative, or not finite.
    pub fn normalised(map: SuperpopMap<f64>) -> Result<Self, SuperpopError> {
        let sum = map.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(SuperpopError::Unnormalisable(sum));
        }
        Ok(Self(map.map(|_, value| value / sum)))
    }

    /// The uniform prior: 0.2 for every superpopulation.
    #[must_use]
    pub fn uniform() -> Self {
        Self(SuperpopMap::splat(1.0 / Superpop::COUNT as f64))
    }

    #[must_use]
    pub fn argmax(&self) -> Superpop {
        self.0.argmax()
    }

    #[must_use]
    pub fn as_map(&self) -> &SuperpopMap<f64> {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Superpop, f64)> + '_ {
        self.0.iter().map(|(pop, value)| (pop, *value))
    }
}

impl Index<Superpop> for Proportions {
    type Output = f64;

    fn index(&self, pop: Superpop) -> &Self::Output {
        &self.0[pop]
    }
}

impl TryFrom<SuperpopMap<f64>> for Proportions {
    type Error = SuperpopError;

    fn try_from(map: SuperpopMap<f64>) -> Result<Self, Self::Error> {
        Self::try_new(map)
    }
}

impl From<Proportions> for SuperpopMap<f64> {
    fn from(proportions: Proportions) -> Self {
        proportions.0
    }
}

impl Display for Proportions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (pop, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{pop}={value:.4}")?;
            first = false;
        }
        Ok(())
    }
}
