use serde::Deserialize;

/// Wire response from a remote recognition endpoint.
///
/// A missing or empty `plates` array means "nothing read"; only the first
/// candidate is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct PlateListResponse {
    #[serde(default)]
    pub plates: Vec<PlateCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlateCandidate {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_plates_field_defaults_to_empty() {
        let parsed: PlateListResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.plates.is_empty());
    }

    #[test]
    fn parses_candidate_list() {
        let parsed: PlateListResponse = serde_json::from_str(
            r#"{"plates":[{"text":"AB12CD34","confidence":0.92},{"text":"ZZ99","confidence":0.4}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.plates.len(), 2);
        assert_eq!(parsed.plates[0].text, "AB12CD34");
        assert!((parsed.plates[0].confidence - 0.92).abs() < 1e-6);
    }
}
