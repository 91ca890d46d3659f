use rand::Rng;

/// Canonical plate key: uppercase, `[A-Z0-9]` only.
///
/// Total and idempotent. An empty result means no usable plate text; the
/// caller decides what that implies.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Produces fallback asset ids for previews without plate text.
pub trait AssetIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ASSET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `ASSET-XXXX-XXXX` with uppercase alphanumeric segments.
#[derive(Debug, Default)]
pub struct RandomAssetIds;

impl RandomAssetIds {
    fn segment<R: Rng>(rng: &mut R) -> String {
        (0..4)
            .map(|_| ASSET_CHARSET[rng.gen_range(0..ASSET_CHARSET.len())] as char)
            .collect()
    }
}

impl AssetIdGenerator for RandomAssetIds {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        format!(
            "ASSET-{}-{}",
            Self::segment(&mut rng),
            Self::segment(&mut rng)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_and_uppercases() {
        assert_eq!(normalize("ab 12 cd3"), "AB12CD3");
        assert_eq!(normalize("  mh-12/ab.1234 "), "MH12AB1234");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("-- ..//"), "");
    }

    #[test]
    fn drops_non_ascii_letters() {
        // ß uppercases to "SS"; Ä and 京 are not ASCII alphanumerics
        assert_eq!(normalize("京A·ß12Ä"), "ASS12");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn normalization_is_idempotent(raw in any::<String>()) {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert!(once
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }

        #[test]
        fn separators_between_parts_are_ignored(
            head in any::<String>(),
            sep in "[ \\-./·_]{0,4}",
            tail in any::<String>()
        ) {
            let joined = format!("{}{}{}", head, sep, tail);
            prop_assert_eq!(normalize(&joined), normalize(&head) + &normalize(&tail));
        }
    }

    #[test]
    fn generated_asset_ids_follow_the_scheme() {
        let gen = RandomAssetIds;
        for _ in 0..50 {
            let id = gen.generate();
            let parts: Vec<&str> = id.split('-').collect();
            assert_eq!(parts.len(), 3, "{}", id);
            assert_eq!(parts[0], "ASSET");
            for seg in &parts[1..] {
                assert_eq!(seg.len(), 4);
                assert!(seg
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            }
        }
    }
}
