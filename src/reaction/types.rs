use crate::error::{EthynylError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of atom that take part in a reaction.
///
/// Carbon is kind A (two per radical), hydrogen is kind B (one per radical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Carbon,
    Hydrogen,
}

impl Kind {
    /// Drain order: hydrogen first, then carbon.
    pub const ALL: [Kind; 2] = [Kind::Hydrogen, Kind::Carbon];

    /// Number of atoms of this kind consumed by one reaction.
    pub fn multiplicity(self) -> u64 {
        match self {
            Kind::Carbon => 2,
            Kind::Hydrogen => 1,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            Kind::Carbon => 'c',
            Kind::Hydrogen => 'h',
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Carbon => write!(f, "carbon"),
            Kind::Hydrogen => write!(f, "hydrogen"),
        }
    }
}

/// One atom. Ids are numbered per kind starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Worker {
    pub kind: Kind,
    pub id: u32,
}

impl Worker {
    pub fn new(kind: Kind, id: u32) -> Self {
        Self { kind, id }
    }

    pub fn carbon(id: u32) -> Self {
        Self::new(Kind::Carbon, id)
    }

    pub fn hydrogen(id: u32) -> Self {
        Self::new(Kind::Hydrogen, id)
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.kind.prefix(), self.id)
    }
}

/// Slot a worker occupies inside a forming radical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    FirstCarbon,
    SecondCarbon,
    Hydrogen,
}

impl Role {
    /// Roles are always recruited in this order.
    pub const ASSEMBLY_ORDER: [Role; 3] = [Role::FirstCarbon, Role::SecondCarbon, Role::Hydrogen];

    pub fn kind(self) -> Kind {
        match self {
            Role::FirstCarbon | Role::SecondCarbon => Kind::Carbon,
            Role::Hydrogen => Kind::Hydrogen,
        }
    }

    /// The role a trigger of `kind` fills itself before recruiting the rest.
    pub fn taken_by_trigger(kind: Kind) -> Self {
        match kind {
            Kind::Carbon => Role::SecondCarbon,
            Kind::Hydrogen => Role::Hydrogen,
        }
    }

    fn index(self) -> usize {
        match self {
            Role::FirstCarbon => 0,
            Role::SecondCarbon => 1,
            Role::Hydrogen => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::FirstCarbon => write!(f, "first carbon"),
            Role::SecondCarbon => write!(f, "second carbon"),
            Role::Hydrogen => write!(f, "hydrogen"),
        }
    }
}

/// Population sizes per kind, fixed before any worker registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub carbon: u32,
    pub hydrogen: u32,
}

impl Totals {
    /// Largest population a single run accepts.
    pub const MAX_ATOMS: u64 = 1_000_000;

    pub fn new(carbon: u32, hydrogen: u32) -> Self {
        Self { carbon, hydrogen }
    }

    /// Build totals from untrusted signed counts, rejecting negatives and
    /// populations larger than [`Totals::MAX_ATOMS`].
    pub fn checked(carbon: i64, hydrogen: i64) -> Result<Self> {
        let totals = Self {
            carbon: count_for(Kind::Carbon, carbon)?,
            hydrogen: count_for(Kind::Hydrogen, hydrogen)?,
        };
        Self::within_limit(totals.atoms())?;
        Ok(totals)
    }

    /// Reject a population too large to run.
    pub fn within_limit(atoms: u64) -> Result<()> {
        if atoms > Self::MAX_ATOMS {
            return Err(EthynylError::Configuration(format!(
                "{atoms} atoms exceeds the limit of {} per run",
                Self::MAX_ATOMS
            )));
        }
        Ok(())
    }

    pub fn of(&self, kind: Kind) -> u32 {
        match kind {
            Kind::Carbon => self.carbon,
            Kind::Hydrogen => self.hydrogen,
        }
    }

    /// floor(min(hydrogen, carbon / 2))
    pub fn max_reactions(&self) -> u64 {
        u64::from(self.hydrogen).min(u64::from(self.carbon) / Kind::Carbon.multiplicity())
    }

    /// Workers of `kind` left over once every possible reaction has formed.
    pub fn excess(&self, kind: Kind) -> u64 {
        u64::from(self.of(kind)) - self.max_reactions() * kind.multiplicity()
    }

    pub fn atoms(&self) -> u64 {
        u64::from(self.carbon) + u64::from(self.hydrogen)
    }
}

fn count_for(kind: Kind, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        EthynylError::Configuration(format!("{value} is not a valid number of {kind} atoms"))
    })
}

/// The three role slots of the radical currently being assembled.
#[derive(Debug, Default)]
pub struct CombiningGroup {
    slots: [Option<u32>; 3],
}

impl CombiningGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&mut self, role: Role, id: u32) -> Result<()> {
        let slot = &mut self.slots[role.index()];
        if let Some(existing) = slot {
            return Err(EthynylError::invariant(format!(
                "{role} slot already holds {}{existing:03}, refusing {}{id:03}",
                role.kind().prefix(),
                role.kind().prefix()
            )));
        }
        *slot = Some(id);
        Ok(())
    }

    /// True when no role of the current radical has been written.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Read all three slots and reset the group for the next reaction.
    pub fn take(&mut self) -> Result<[u32; 3]> {
        let mut ids = [0; 3];
        for role in Role::ASSEMBLY_ORDER {
            ids[role.index()] = self.slots[role.index()].ok_or_else(|| {
                EthynylError::invariant(format!("{role} slot read before it was written"))
            })?;
        }
        self.slots = [None; 3];
        Ok(ids)
    }
}

/// One completed radical, as handed to the reaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub sequence: u64,
    pub first_carbon: u32,
    pub second_carbon: u32,
    pub hydrogen: u32,
    pub trigger: String,
}

impl ReactionRecord {
    pub fn participants(&self) -> [Worker; 3] {
        [
            Worker::carbon(self.first_carbon),
            Worker::carbon(self.second_carbon),
            Worker::hydrogen(self.hydrogen),
        ]
    }
}

impl fmt::Display for ReactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c1, c2, h] = self.participants();
        write!(f, "{:04}: {c1} {c2} {h} (trigger {})", self.sequence, self.trigger)
    }
}

/// How a worker left the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Reacted { role: Role },
    Drained,
}

impl Resolution {
    pub fn is_reacted(&self) -> bool {
        matches!(self, Resolution::Reacted { .. })
    }
}
