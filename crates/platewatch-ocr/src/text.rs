/// Canonicalizes raw recognizer output into a plate string.
///
/// Strips everything but ASCII alphanumerics, uppercases, and accepts only
/// plausible plate lengths (6 to 9 characters). Anything else collapses to
/// the empty string, which downstream treats as "no plate read".
pub fn clean_plate_text(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if (6..=9).contains(&cleaned.chars().count()) {
        cleaned
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_uppercases() {
        assert_eq!(clean_plate_text("ab-12 CD34!"), "AB12CD34");
    }

    #[test]
    fn rejects_implausible_lengths() {
        assert_eq!(clean_plate_text("A1"), "");
        assert_eq!(clean_plate_text("ABCDEFGHIJ1234"), "");
        assert_eq!(clean_plate_text(""), "");
    }

    #[test]
    fn boundary_lengths_are_accepted() {
        assert_eq!(clean_plate_text("AB12CD"), "AB12CD");
        assert_eq!(clean_plate_text("AB12CD345"), "AB12CD345");
    }
}
