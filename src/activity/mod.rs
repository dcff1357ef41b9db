pub mod ledger;
pub mod tier;

pub use ledger::ActivityLedger;
pub use tier::RoleTier;
