//! Global task id helpers.
//!
//! Task ids are ULIDs: 26 characters of Crockford base32, lexicographically
//! ordered by creation time, which makes them prefix-searchable.

use ulid::Ulid;

/// Length of a full global id
pub const GLOBAL_ID_LEN: usize = 26;

/// Minimum length accepted for a prefix search
pub const MIN_PREFIX_LEN: usize = 4;

const CROCKFORD_CHARSET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Generate a fresh global task id.
pub fn generate_task_id() -> String {
    Ulid::new().to_string()
}

/// Normalize an id or prefix for comparison.
pub fn normalize_id(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

fn is_base32(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| CROCKFORD_CHARSET.contains(ch))
}

/// True when `value` has the shape of a full global id.
pub fn is_global_id(value: &str) -> bool {
    value.len() == GLOBAL_ID_LEN && is_base32(value)
}

/// True when `value` is usable as a global id prefix.
pub fn is_id_prefix(value: &str) -> bool {
    value.len() >= MIN_PREFIX_LEN && value.len() < GLOBAL_ID_LEN && is_base32(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_well_formed() {
        let id = generate_task_id();
        assert!(is_global_id(&id));
        assert!(!is_id_prefix(&id));
    }

    #[test]
    fn generated_ids_sort_by_creation_time() {
        let first = generate_task_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generate_task_id();
        assert!(first < second);
    }

    #[test]
    fn prefix_classification() {
        assert!(is_id_prefix("01HX"));
        assert!(is_id_prefix(&normalize_id("01hx2v")));
        assert!(!is_id_prefix("01H"));
        assert!(!is_id_prefix("01HU")); // U is not in the Crockford alphabet
        assert!(!is_id_prefix("nope"));
    }
}
