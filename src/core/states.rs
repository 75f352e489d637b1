//! Indian state tables for GST processing.
//!
//! Three fixed lookups: GSTIN two-digit state codes → canonical state
//! name, canonical state name → two-letter abbreviation (used in invoice
//! numbers), and the normalization helper that canonicalizes whatever a
//! marketplace report puts in its ship-to column.

/// Resolve a GSTIN two-digit state code to the canonical state name.
pub fn state_name_for_code(code: &str) -> Option<&'static str> {
    GST_STATE_CODES
        .binary_search_by(|(c, _)| c.cmp(&code))
        .ok()
        .map(|i| GST_STATE_CODES[i].1)
}

/// Two-letter abbreviation for a canonical state name.
///
/// Unknown names fall back to the first two letters of the uppercased
/// name so the result is always deterministic.
pub fn state_abbreviation(name: &str) -> String {
    let canonical = name.trim().to_uppercase();
    if let Ok(i) = STATE_ABBREVIATIONS.binary_search_by(|(n, _)| n.cmp(&canonical.as_str())) {
        return STATE_ABBREVIATIONS[i].1.to_string();
    }
    canonical.chars().filter(|c| c.is_ascii_alphabetic()).take(2).collect()
}

/// Canonicalize a raw ship-to state field: trim, upper-case, and map
/// two-digit GST codes through the code table. Unknown values pass
/// through upper-cased.
pub fn canonical_state(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        if let Some(name) = state_name_for_code(trimmed) {
            return name.to_string();
        }
    }
    trimmed.to_uppercase()
}

/// Whether `name` is a known canonical state or union-territory name.
pub fn is_known_state(name: &str) -> bool {
    STATE_ABBREVIATIONS
        .binary_search_by(|(n, _)| n.cmp(&name))
        .is_ok()
}

/// GSTIN state codes (38 entries, sorted by code for binary search).
/// Codes 28 and 37 both map to Andhra Pradesh (pre/post bifurcation).
static GST_STATE_CODES: &[(&str, &str)] = &[
    ("01", "JAMMU AND KASHMIR"),
    ("02", "HIMACHAL PRADESH"),
    ("03", "PUNJAB"),
    ("04", "CHANDIGARH"),
    ("05", "UTTARAKHAND"),
    ("06", "HARYANA"),
    ("07", "DELHI"),
    ("08", "RAJASTHAN"),
    ("09", "UTTAR PRADESH"),
    ("10", "BIHAR"),
    ("11", "SIKKIM"),
    ("12", "ARUNACHAL PRADESH"),
    ("13", "NAGALAND"),
    ("14", "MANIPUR"),
    ("15", "MIZORAM"),
    ("16", "TRIPURA"),
    ("17", "MEGHALAYA"),
    ("18", "ASSAM"),
    ("19", "WEST BENGAL"),
    ("20", "JHARKHAND"),
    ("21", "ODISHA"),
    ("22", "CHHATTISGARH"),
    ("23", "MADHYA PRADESH"),
    ("24", "GUJARAT"),
    ("25", "DAMAN AND DIU"),
    ("26", "DADRA AND NAGAR HAVELI AND DAMAN AND DIU"),
    ("27", "MAHARASHTRA"),
    ("28", "ANDHRA PRADESH"),
    ("29", "KARNATAKA"),
    ("30", "GOA"),
    ("31", "LAKSHADWEEP"),
    ("32", "KERALA"),
    ("33", "TAMIL NADU"),
    ("34", "PUDUCHERRY"),
    ("35", "ANDAMAN AND NICOBAR ISLANDS"),
    ("36", "TELANGANA"),
    ("37", "ANDHRA PRADESH"),
    ("38", "LADAKH"),
];

/// Canonical state name → two-letter abbreviation (sorted by name).
static STATE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("ANDAMAN AND NICOBAR ISLANDS", "AN"),
    ("ANDHRA PRADESH", "AP"),
    ("ARUNACHAL PRADESH", "AR"),
    ("ASSAM", "AS"),
    ("BIHAR", "BR"),
    ("CHANDIGARH", "CH"),
    ("CHHATTISGARH", "CG"),
    ("DADRA AND NAGAR HAVELI AND DAMAN AND DIU", "DN"),
    ("DAMAN AND DIU", "DD"),
    ("DELHI", "DL"),
    ("GOA", "GA"),
    ("GUJARAT", "GJ"),
    ("HARYANA", "HR"),
    ("HIMACHAL PRADESH", "HP"),
    ("JAMMU AND KASHMIR", "JK"),
    ("JHARKHAND", "JH"),
    ("KARNATAKA", "KA"),
    ("KERALA", "KL"),
    ("LADAKH", "LA"),
    ("LAKSHADWEEP", "LD"),
    ("MADHYA PRADESH", "MP"),
    ("MAHARASHTRA", "MH"),
    ("MANIPUR", "MN"),
    ("MEGHALAYA", "ML"),
    ("MIZORAM", "MZ"),
    ("NAGALAND", "NL"),
    ("ODISHA", "OD"),
    ("PUDUCHERRY", "PY"),
    ("PUNJAB", "PB"),
    ("RAJASTHAN", "RJ"),
    ("SIKKIM", "SK"),
    ("TAMIL NADU", "TN"),
    ("TELANGANA", "TS"),
    ("TRIPURA", "TR"),
    ("UTTAR PRADESH", "UP"),
    ("UTTARAKHAND", "UK"),
    ("WEST BENGAL", "WB"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(state_name_for_code("06"), Some("HARYANA"));
        assert_eq!(state_name_for_code("07"), Some("DELHI"));
        assert_eq!(state_name_for_code("29"), Some("KARNATAKA"));
        assert_eq!(state_name_for_code("37"), Some("ANDHRA PRADESH"));
        assert_eq!(state_name_for_code("00"), None);
        assert_eq!(state_name_for_code("99"), None);
    }

    #[test]
    fn abbreviations() {
        assert_eq!(state_abbreviation("ANDHRA PRADESH"), "AP");
        assert_eq!(state_abbreviation("HARYANA"), "HR");
        assert_eq!(state_abbreviation("DELHI"), "DL");
        assert_eq!(state_abbreviation("haryana"), "HR");
    }

    #[test]
    fn abbreviation_fallback_is_deterministic() {
        assert_eq!(state_abbreviation("NARNIA"), "NA");
        assert_eq!(state_abbreviation("x"), "X");
        assert_eq!(state_abbreviation(""), "");
    }

    #[test]
    fn canonicalizes_codes_and_names() {
        assert_eq!(canonical_state("27"), "MAHARASHTRA");
        assert_eq!(canonical_state(" haryana "), "HARYANA");
        assert_eq!(canonical_state("Delhi"), "DELHI");
        // Unknown two-digit codes pass through unchanged (upper-cased).
        assert_eq!(canonical_state("99"), "99");
    }

    #[test]
    fn tables_are_sorted() {
        for w in GST_STATE_CODES.windows(2) {
            assert!(w[0].0 < w[1].0, "codes not sorted: {} >= {}", w[0].0, w[1].0);
        }
        for w in STATE_ABBREVIATIONS.windows(2) {
            assert!(w[0].0 < w[1].0, "names not sorted: {} >= {}", w[0].0, w[1].0);
        }
    }

    #[test]
    fn table_counts() {
        assert_eq!(GST_STATE_CODES.len(), 38);
        assert_eq!(STATE_ABBREVIATIONS.len(), 37);
    }
}
