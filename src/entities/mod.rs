// Entity Models
// Firm identity: stable canonical key + the identifier variants that map onto it

pub mod firm;

pub use firm::{levenshtein_distance, normalize_firm_name, similarity, Crosswalk};
