//! Shared test utilities for quill crates.
//!
//! - [`TestDir`] - Managed temporary directory that can host an [`Environment`](quill_schema::Environment)
//! - [`test_environment_config`] - Environment settings tuned for tests
//! - [`strategies`] - Proptest generators for field types and values

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::{TestDir, test_environment_config};

pub mod strategies;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    // ============================================
    // TestDir tests
    // ============================================

    #[test]
    fn test_dir_creates_temp_directory() {
        let dir = TestDir::new();
        assert!(dir.path().exists(), "temp directory should exist");
        assert!(dir.path().is_dir(), "should be a directory");
    }

    #[test]
    fn test_dir_join_creates_subdirectory_path() {
        let dir = TestDir::new();
        let subpath = dir.join("subdir/nested");
        assert!(subpath.starts_with(dir.path()));
        assert!(subpath.ends_with("subdir/nested"));
    }

    #[test]
    fn test_dir_cleanup_on_drop() {
        let path = {
            let dir = TestDir::new();
            let p = dir.path().to_path_buf();
            std::fs::write(p.join("file.txt"), "data").expect("write file");
            assert!(p.exists());
            p
        };
        assert!(!path.exists(), "temp directory should be cleaned up on drop");
    }

    #[test]
    fn test_open_environment_creates_catalog() {
        let dir = TestDir::new();
        let env = dir.open_environment();
        assert!(env.is_open());
        assert!(dir.join("_system").is_dir(), "catalog directory should exist");
        assert_eq!(env.get_int("scheduler.threads").unwrap(), Some(1));
    }

    // ============================================
    // Strategy tests
    // ============================================

    proptest! {
        #[test]
        fn generated_values_encode(
            (ty, value) in strategies::arb_field_type()
                .prop_flat_map(|ty| (Just(ty.clone()), strategies::arb_value_for(&ty)))
        ) {
            prop_assert!(ty.encode(&value).is_ok(), "{ty} rejected {value}");
        }

        #[test]
        fn generated_names_are_valid(name in strategies::arb_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.contains('.'));
        }
    }
}
