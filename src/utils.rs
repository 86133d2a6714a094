/// True for a CURIE-style accession such as `MS:1003061` or `UO:0000010`:
/// an alphabetic prefix, a colon, and a non-empty alphanumeric local part.
pub fn is_accession(text: &str) -> bool {
    let Some((prefix, local)) = text.split_once(':') else {
        return false;
    };
    let mut prefix_chars = prefix.chars();
    let prefix_ok = prefix_chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && prefix_chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    prefix_ok
        && !local.is_empty()
        && local.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits a `ACCESSION|value` pair into its parts, when it is one. The value
/// part may be empty.
pub fn split_term_reference(text: &str) -> Option<(&str, &str)> {
    let (accession, value) = text.split_once('|')?;
    is_accession(accession).then_some((accession, value))
}

/// Guards float parsing so that words like `inf` or `NaN` stay strings.
pub fn looks_numeric(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessions() {
        assert!(is_accession("MS:1003061"));
        assert!(is_accession("UO:0000010"));
        assert!(is_accession("NCIT:C25330"));
        assert!(!is_accession("1003061"));
        assert!(!is_accession("MS:"));
        assert!(!is_accession(":123"));
        assert!(!is_accession("MS 1003061"));
    }

    #[test]
    fn test_term_references() {
        assert_eq!(
            split_term_reference("UO:0000010|second"),
            Some(("UO:0000010", "second"))
        );
        assert_eq!(split_term_reference("PEPTIDE|2"), None);
        assert_eq!(split_term_reference("UO:0000010|"), Some(("UO:0000010", "")));
    }
}
