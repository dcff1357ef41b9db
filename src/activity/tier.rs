use core::fmt;

/// Activity tiers, ordered from most to least active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTier {
    Veteran,
    KaempeFisk,
    StorFisk,
    LilleFisk,
}

impl RoleTier {
    /// Descending by threshold; the first tier whose threshold the count reaches wins.
    pub const ALL: [RoleTier; 4] = [
        RoleTier::Veteran,
        RoleTier::KaempeFisk,
        RoleTier::StorFisk,
        RoleTier::LilleFisk,
    ];

    pub fn for_count(count: u64) -> Self {
        Self::ALL
            .into_iter()
            .find(|tier| count >= tier.threshold())
            .unwrap_or(RoleTier::LilleFisk)
    }

    /// Inclusive lower bound on the message count.
    pub const fn threshold(&self) -> u64 {
        match self {
            RoleTier::Veteran => 1500,
            RoleTier::KaempeFisk => 500,
            RoleTier::StorFisk => 250,
            RoleTier::LilleFisk => 0,
        }
    }

    /// Exact name of the guild role granted for this tier.
    pub const fn role_name(&self) -> &'static str {
        match self {
            RoleTier::Veteran => "Veteran",
            RoleTier::KaempeFisk => "Kæmpe Fisk",
            RoleTier::StorFisk => "Stor Fisk",
            RoleTier::LilleFisk => "Lille Fisk",
        }
    }
}

impl fmt::Display for RoleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role_name())
    }
}
