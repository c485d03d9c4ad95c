use crate::model::{Key, Language, Resource, ResourceStatus};

/// Non-default cultures whose resource is absent or empty for this key.
///
/// Returns nothing when the default-language resource itself has no value:
/// with no source text there is nothing to translate from, and the key is
/// skipped rather than treated as an error.
pub fn find_missing(key: &Key, languages: &[Language], default_code: &str) -> Vec<Resource> {
    let default_filled = key
        .resource(default_code)
        .map(|r| r.is_filled())
        .unwrap_or(false);
    if !default_filled {
        return Vec::new();
    }

    languages
        .iter()
        .filter(|lang| lang.code != default_code)
        .filter(|lang| {
            key.resource(&lang.code)
                .map(|r| !r.is_filled())
                .unwrap_or(true)
        })
        .map(|lang| {
            key.resource(&lang.code)
                .cloned()
                .unwrap_or_else(|| Resource::placeholder(&lang.code))
        })
        .collect()
}

/// Ensure the missing set carries one slot per configured language that has
/// no entry anywhere yet, so the key ends up with a full resource matrix.
/// The reserved metadata culture never gets a slot.
pub fn compare_and_add_resources(
    missing: &mut Vec<Resource>,
    resources: &[Resource],
    languages: &[Language],
) {
    for lang in languages {
        let in_resources = resources.iter().any(|r| r.culture == lang.code);
        let in_missing = missing.iter().any(|r| r.culture == lang.code);
        if !in_resources && !in_missing {
            missing.push(Resource::placeholder(&lang.code));
        }
    }
}

/// If the default-culture resource was reset, blank every resource value on
/// the key so it re-enters the translation matrix from scratch. Returns
/// whether the key was touched.
pub fn clear_reserved_resources(key: &mut Key, default_code: &str) -> bool {
    let needs_reset = key
        .resource(default_code)
        .map(|r| r.status == ResourceStatus::NeedsReset)
        .unwrap_or(false);
    if !needs_reset {
        return false;
    }

    for resource in &mut key.resources {
        resource.value.clear();
        resource.character_length = None;
        resource.status = ResourceStatus::Empty;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RESERVED_SENTINEL;

    fn languages() -> Vec<Language> {
        let mut en = Language::new("en-US", "English", "tenant-a");
        en.is_default = true;
        vec![
            en,
            Language::new("fr-FR", "French", "tenant-a"),
            Language::new("de-DE", "German", "tenant-a"),
        ]
    }

    fn key_with(resources: Vec<Resource>) -> Key {
        let mut key = Key::new("home.title", "mod-1", "tenant-a", "tester");
        for r in resources {
            key.put_resource(r);
        }
        key
    }

    #[test]
    fn test_find_missing_skips_key_with_empty_default() {
        let key = key_with(vec![Resource::new("en-US", "")]);
        assert!(find_missing(&key, &languages(), "en-US").is_empty());

        let key = key_with(vec![Resource::new("fr-FR", "Bonjour")]);
        assert!(find_missing(&key, &languages(), "en-US").is_empty());
    }

    #[test]
    fn test_find_missing_reports_absent_and_empty_cultures() {
        let key = key_with(vec![
            Resource::new("en-US", "Hello"),
            Resource::new("fr-FR", ""),
        ]);
        let missing = find_missing(&key, &languages(), "en-US");

        let cultures: Vec<&str> = missing.iter().map(|r| r.culture.as_str()).collect();
        assert_eq!(cultures, vec!["fr-FR", "de-DE"]);
    }

    #[test]
    fn test_find_missing_ignores_filled_cultures() {
        let key = key_with(vec![
            Resource::new("en-US", "Hello"),
            Resource::new("fr-FR", "Bonjour"),
            Resource::new("de-DE", "Hallo"),
        ]);
        assert!(find_missing(&key, &languages(), "en-US").is_empty());
    }

    #[test]
    fn test_compare_and_add_gives_one_slot_per_language() {
        let resources = vec![Resource::new("en-US", "Hello")];
        let mut missing = vec![Resource::placeholder("fr-FR")];

        compare_and_add_resources(&mut missing, &resources, &languages());

        let cultures: Vec<&str> = missing.iter().map(|r| r.culture.as_str()).collect();
        assert_eq!(cultures, vec!["fr-FR", "de-DE"]);
    }

    #[test]
    fn test_compare_and_add_never_duplicates() {
        let resources = vec![
            Resource::new("en-US", "Hello"),
            Resource::new("fr-FR", "Bonjour"),
            Resource::new("de-DE", "Hallo"),
        ];
        let mut missing = Vec::new();

        compare_and_add_resources(&mut missing, &resources, &languages());
        assert!(missing.is_empty());
    }

    #[test]
    fn test_clear_reserved_blanks_all_resources() {
        let mut key = key_with(vec![
            Resource::new("en-US", RESERVED_SENTINEL),
            Resource::new("fr-FR", "Bonjour"),
        ]);

        assert!(clear_reserved_resources(&mut key, "en-US"));
        for resource in &key.resources {
            assert!(resource.value.is_empty());
            assert_eq!(resource.status, ResourceStatus::Empty);
        }
    }

    #[test]
    fn test_clear_reserved_noop_without_sentinel() {
        let mut key = key_with(vec![
            Resource::new("en-US", "Hello"),
            Resource::new("fr-FR", RESERVED_SENTINEL),
        ]);

        // Only the default culture triggers the reset
        assert!(!clear_reserved_resources(&mut key, "en-US"));
        assert_eq!(key.resource("en-US").unwrap().value, "Hello");
    }
}
