//! URL slugs for catalog entries.

/// Turn a display name into a lower-case, hyphen-separated slug.
///
/// Non-alphanumeric runs collapse to a single hyphen; leading and trailing
/// hyphens are dropped. Common Latin diacritics are folded to ASCII.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        let mapped = fold_diacritic(c);
        if mapped.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(mapped);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Whether `slug` is already in canonical form.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

const fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ğ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ı' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
        'ş' => 's',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Wireless Headphones"), "wireless-headphones");
        assert_eq!(slugify("  USB-C  Cable (2m) "), "usb-c-cable-2m");
    }

    #[test]
    fn test_slugify_folds_diacritics() {
        assert_eq!(slugify("Çay Bardağı"), "cay-bardagi");
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
    }

    #[test]
    fn test_slugify_only_symbols() {
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("home-garden"));
        assert!(!is_valid_slug("Home Garden"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug(""));
    }
}
