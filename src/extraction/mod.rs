//! Entity Extraction - Pattern-Battery Identifier Extraction
//!
//! `TigerStyle`: Deterministic, side-effect-free, graceful degradation.
//!
//! # Architecture
//!
//! ```text
//! EntityExtractor
//! ├── extract()       → ExtractedEntities (never fails)
//! ├── extract_batch() → Vec<ExtractedEntities>
//! └── Ordered battery of (EntityClass, Regex) matchers,
//!     one dispatch loop, post-pass disambiguation
//! ```
//!
//! Over-extraction is tolerated; under-extraction is not. Downstream
//! consolidation treats "present in entities" as the preservation oracle,
//! so a matcher that fires on a false positive costs a few bytes while a
//! matcher that misses loses information permanently.
//!
//! Malformed input never produces an error: empty text yields an empty
//! set, oversized text is truncated at a char boundary.

mod entities;

pub use entities::{ExtractedEntities, StackFrame};

use regex::Regex;

use crate::constants::{EXTRACTION_CLASS_ENTITIES_COUNT_MAX, EXTRACTION_TEXT_BYTES_MAX};

// =============================================================================
// Matcher Battery
// =============================================================================

/// Entity classes the battery can route captures to.
///
/// `TigerStyle`: Exhaustive enum prevents invalid states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityClass {
    ErrorType,
    ErrorMessage,
    PythonFrame,
    JsFrame,
    FunctionName,
    ClassName,
    VariableName,
    FilePath,
    LineNumber,
    ConfigKey,
    EnvironmentVar,
    DatabaseField,
    Timestamp,
    Url,
    IpAddress,
    Version,
    HashValue,
}

/// Common words that the identifier matchers must never emit.
const IDENTIFIER_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "called", "can", "did", "do", "does",
    "error", "file", "for", "from", "function", "had", "has", "have", "how", "if", "in", "is",
    "it", "line", "may", "not", "of", "on", "or", "return", "set", "so", "that", "the", "then",
    "this", "to", "value", "was", "what", "when", "where", "which", "while", "who", "will",
    "with", "would",
];

/// File extensions recognized by the path matcher; also used to keep
/// `table.column` candidates from swallowing file names.
const FILE_EXTENSIONS: &[&str] = &[
    "c", "cfg", "conf", "cpp", "cs", "css", "go", "h", "hpp", "html", "ini", "java", "js",
    "json", "jsx", "log", "md", "py", "rb", "rs", "sh", "sql", "toml", "ts", "tsx", "txt",
    "yaml", "yml",
];

// =============================================================================
// EntityExtractor
// =============================================================================

/// Pattern-battery entity extractor.
///
/// Deterministic and side-effect-free: the same text always yields the same
/// entity set, and extraction never fails on malformed input.
///
/// # Example
///
/// ```rust
/// use memshed::extraction::EntityExtractor;
///
/// let extractor = EntityExtractor::new();
/// let entities = extractor.extract("TypeError in auth.py line 42: validateToken() failed");
///
/// assert!(entities.error_types.contains("TypeError"));
/// assert!(entities.function_names.contains("validateToken"));
/// ```
#[derive(Debug)]
pub struct EntityExtractor {
    battery: Vec<(EntityClass, Regex)>,
}

impl EntityExtractor {
    /// Create a new extractor with the full matcher battery compiled.
    ///
    /// # Panics
    /// Panics only if a built-in pattern fails to compile, which would be a
    /// programming error caught by the test suite.
    #[must_use]
    pub fn new() -> Self {
        use EntityClass::*;

        let table: &[(EntityClass, &str)] = &[
            (ErrorType, r"\b([A-Z][A-Za-z]*(?:Error|Exception|Panic|Fault))\b"),
            (ErrorMessage, r"(?m)\b[A-Za-z]*(?:Error|ERROR|Exception)\b:\s*([^\n]{4,200})"),
            (PythonFrame, r#"File "([^"]+)", line (\d+), in (\w+)"#),
            (JsFrame, r"at (\w+) \(([^():\s]+):(\d+):(\d+)\)"),
            (FunctionName, r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\("),
            (ClassName, r"\b([A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+)\b"),
            (VariableName, r"\b([a-z][a-z0-9]*(?:_[a-z0-9]+)+)\b"),
            (FilePath, r"[\w./\\-]*\w\.(?:c|cfg|conf|cpp|cs|css|go|h|hpp|html|ini|java|jsx?|json|log|md|py|rb|rs|sh|sql|toml|tsx?|txt|yaml|yml)\b"),
            (LineNumber, r"(?i)\bline[:\s]+(\d{1,6})\b"),
            (ConfigKey, r"\b([A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+)\b"),
            (EnvironmentVar, r"\b([A-Z][A-Z0-9_]+)=(\S+)"),
            (DatabaseField, r"\b([a-z][a-z0-9_]*\.[a-z][a-z0-9_]*)\b"),
            (Timestamp, r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?"),
            (Url, r#"https?://[^\s"'<>)]+"#),
            (IpAddress, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
            (Version, r"\bv?\d+\.\d+\.\d+(?:\.\d+)*(?:-[0-9A-Za-z.]+)?\b"),
            (HashValue, r"\b[0-9a-f]{7,40}\b"),
        ];

        let battery = table
            .iter()
            .map(|(class, pattern)| {
                let regex = Regex::new(pattern)
                    .unwrap_or_else(|e| panic!("built-in pattern failed to compile: {e}"));
                (*class, regex)
            })
            .collect();

        Self { battery }
    }

    /// Extract all technical entities from `text`.
    ///
    /// Never fails: empty or malformed input yields an empty-but-valid set,
    /// oversized input is truncated at a char boundary.
    #[must_use]
    pub fn extract(&self, text: &str) -> ExtractedEntities {
        let text = truncate_at_char_boundary(text, EXTRACTION_TEXT_BYTES_MAX);
        if text.trim().is_empty() {
            return ExtractedEntities::new();
        }

        let mut out = ExtractedEntities::new();
        // Spans of URLs and file paths, used to reject overlapping
        // `table.column` candidates in the post-pass.
        let mut claimed_spans: Vec<(usize, usize)> = Vec::new();
        let mut db_candidates: Vec<(usize, usize, String)> = Vec::new();

        for (class, regex) in &self.battery {
            for caps in regex.captures_iter(text).take(EXTRACTION_CLASS_ENTITIES_COUNT_MAX) {
                self.collect(
                    *class,
                    &caps,
                    &mut out,
                    &mut claimed_spans,
                    &mut db_candidates,
                );
            }
        }

        Self::resolve_database_fields(&mut out, &claimed_spans, db_candidates);
        Self::disambiguate(&mut out);

        out
    }

    /// Extract from multiple texts.
    #[must_use]
    pub fn extract_batch(&self, texts: &[&str]) -> Vec<ExtractedEntities> {
        texts.iter().map(|t| self.extract(t)).collect()
    }

    /// Route one capture to its entity class.
    fn collect(
        &self,
        class: EntityClass,
        caps: &regex::Captures<'_>,
        out: &mut ExtractedEntities,
        claimed_spans: &mut Vec<(usize, usize)>,
        db_candidates: &mut Vec<(usize, usize, String)>,
    ) {
        use EntityClass::*;

        let whole = caps.get(0).map_or("", |m| m.as_str());

        match class {
            ErrorType => {
                out.error_types.insert(caps[1].to_string());
            }
            ErrorMessage => {
                out.error_messages.insert(caps[1].trim().to_string());
            }
            PythonFrame => {
                if let Ok(line) = caps[2].parse::<u32>() {
                    out.line_numbers.insert(line);
                    out.stack_frames
                        .insert(StackFrame::new(&caps[1], line, &caps[3]));
                }
            }
            JsFrame => {
                if let Ok(line) = caps[3].parse::<u32>() {
                    out.line_numbers.insert(line);
                    out.stack_frames
                        .insert(StackFrame::new(&caps[2], line, &caps[1]));
                }
            }
            FunctionName => {
                let name = &caps[1];
                if name.len() >= 2 && !is_stopword(name) {
                    out.function_names.insert(name.to_string());
                }
            }
            ClassName => {
                out.class_names.insert(caps[1].to_string());
            }
            VariableName => {
                let name = &caps[1];
                if !is_stopword(name) {
                    out.variable_names.insert(name.to_string());
                }
            }
            FilePath => {
                if let Some(m) = caps.get(0) {
                    claimed_spans.push((m.start(), m.end()));
                    out.file_paths.insert(m.as_str().to_string());
                }
            }
            LineNumber => {
                if let Ok(line) = caps[1].parse::<u32>() {
                    out.line_numbers.insert(line);
                }
            }
            ConfigKey => {
                out.config_keys.insert(caps[1].to_string());
            }
            EnvironmentVar => {
                out.environment_vars
                    .insert(caps[1].to_string(), caps[2].to_string());
            }
            DatabaseField => {
                if let Some(m) = caps.get(1) {
                    db_candidates.push((m.start(), m.end(), m.as_str().to_string()));
                }
            }
            Timestamp => {
                out.timestamps.insert(whole.to_string());
            }
            Url => {
                if let Some(m) = caps.get(0) {
                    claimed_spans.push((m.start(), m.end()));
                    out.urls.insert(m.as_str().trim_end_matches('.').to_string());
                }
            }
            IpAddress => {
                if whole.split('.').all(|octet| octet.parse::<u16>().map_or(false, |v| v <= 255)) {
                    out.ip_addresses.insert(whole.to_string());
                }
            }
            Version => {
                // Four or more numeric segments is an IP, not a version.
                let numeric_segments = whole
                    .trim_start_matches('v')
                    .split('-')
                    .next()
                    .map_or(0, |core| core.split('.').count());
                if numeric_segments <= 3 {
                    out.version_numbers.insert(whole.to_string());
                }
            }
            HashValue => {
                let has_digit = whole.bytes().any(|b| b.is_ascii_digit());
                let has_alpha = whole.bytes().any(|b| b.is_ascii_lowercase());
                if has_digit && has_alpha {
                    out.hash_values.insert(whole.to_string());
                }
            }
        }
    }

    /// Accept `table.column` candidates that are not file names or parts of
    /// URLs/paths.
    fn resolve_database_fields(
        out: &mut ExtractedEntities,
        claimed_spans: &[(usize, usize)],
        candidates: Vec<(usize, usize, String)>,
    ) {
        for (start, end, candidate) in candidates {
            let overlaps_claimed = claimed_spans
                .iter()
                .any(|&(s, e)| start < e && end > s);
            if overlaps_claimed {
                continue;
            }
            let suffix = candidate.rsplit('.').next().unwrap_or("");
            if FILE_EXTENSIONS.contains(&suffix) {
                continue;
            }
            out.database_fields.insert(candidate);
        }
    }

    /// Cross-class cleanup after the battery has run.
    fn disambiguate(out: &mut ExtractedEntities) {
        // CamelCase error types are not class names.
        let error_types = out.error_types.clone();
        out.class_names.retain(|name| !error_types.contains(name));
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Check membership in the identifier stoplist (case-insensitive).
fn is_stopword(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    IDENTIFIER_STOPWORDS.binary_search(&lower.as_str()).is_ok()
}

/// Truncate to at most `max_bytes` without splitting a char.
fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new()
    }

    #[test]
    fn test_stopwords_sorted_for_binary_search() {
        let mut sorted = IDENTIFIER_STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, IDENTIFIER_STOPWORDS);
    }

    #[test]
    fn test_error_type_extraction() {
        let entities = extractor()
            .extract("TypeError: Cannot read property 'x' of undefined. ValueError in validation.");

        assert!(entities.error_types.contains("TypeError"));
        assert!(entities.error_types.contains("ValueError"));
        assert_eq!(entities.error_types.len(), 2);
    }

    #[test]
    fn test_error_message_extraction() {
        let entities = extractor()
            .extract("Error: JWT validation failed due to timestamp mismatch in auth module");

        assert_eq!(entities.error_messages.len(), 1);
        let message = entities.error_messages.iter().next().unwrap();
        assert!(message.contains("JWT validation failed"));
    }

    #[test]
    fn test_python_stack_frame_extraction() {
        let text = "File \"/app/auth.py\", line 42, in validateToken\nFile \"/app/main.py\", line 100, in handle_request";

        let entities = extractor().extract(text);

        assert_eq!(entities.stack_frames.len(), 2);
        let frame = entities
            .stack_frames
            .iter()
            .find(|f| f.file.contains("auth.py"))
            .unwrap();
        assert_eq!(frame.line, 42);
        assert_eq!(frame.function, "validateToken");
    }

    #[test]
    fn test_js_stack_frame_extraction() {
        let entities =
            extractor().extract("at validateToken (auth.js:42:10)\nat handleRequest (main.js:100:5)");

        assert!(entities.stack_frames.len() >= 2);
        let frame = entities
            .stack_frames
            .iter()
            .find(|f| f.function == "validateToken")
            .unwrap();
        assert!(frame.file.contains("auth.js"));
        assert_eq!(frame.line, 42);
    }

    #[test]
    fn test_function_name_extraction() {
        let entities = extractor().extract("Called validateToken() and authenticateUser() functions");

        assert!(entities.function_names.contains("validateToken"));
        assert!(entities.function_names.contains("authenticateUser"));
    }

    #[test]
    fn test_class_name_extraction() {
        let entities = extractor().extract("UserAuthenticator and TokenValidator classes");

        assert!(entities.class_names.contains("UserAuthenticator"));
        assert!(entities.class_names.contains("TokenValidator"));
    }

    #[test]
    fn test_error_types_not_duplicated_as_class_names() {
        let entities = extractor().extract("TypeError thrown by TokenValidator");

        assert!(entities.error_types.contains("TypeError"));
        assert!(!entities.class_names.contains("TypeError"));
        assert!(entities.class_names.contains("TokenValidator"));
    }

    #[test]
    fn test_variable_name_extraction() {
        let entities = extractor().extract("The jwt_timestamp and auth_token variables");

        assert!(entities.variable_names.contains("jwt_timestamp"));
        assert!(entities.variable_names.contains("auth_token"));
    }

    #[test]
    fn test_file_path_extraction() {
        let entities = extractor().extract("Error in src/auth.py and config/settings.json");

        assert!(entities.file_paths.iter().any(|p| p.contains("auth.py")));
        assert!(entities
            .file_paths
            .iter()
            .any(|p| p.contains("settings.json")));
    }

    #[test]
    fn test_config_key_extraction() {
        let entities = extractor().extract("Set DATABASE_URL and API_KEY in environment");

        assert!(entities.config_keys.contains("DATABASE_URL"));
        assert!(entities.config_keys.contains("API_KEY"));
    }

    #[test]
    fn test_environment_variable_extraction() {
        let entities = extractor().extract("NODE_ENV=production and DEBUG=true");

        assert_eq!(entities.environment_vars["NODE_ENV"], "production");
        assert_eq!(entities.environment_vars["DEBUG"], "true");
    }

    #[test]
    fn test_database_field_extraction() {
        let entities = extractor().extract("Query user.email and session.expires_at fields");

        assert!(entities.database_fields.contains("user.email"));
        assert!(entities.database_fields.contains("session.expires_at"));
    }

    #[test]
    fn test_file_names_are_not_database_fields() {
        let entities = extractor().extract("Error in auth.py near user.email");

        assert!(!entities.database_fields.contains("auth.py"));
        assert!(entities.database_fields.contains("user.email"));
    }

    #[test]
    fn test_timestamp_extraction() {
        let entities = extractor().extract("Event at 2025-11-24T15:30:00Z and 2025-11-24 10:00:00");

        assert_eq!(entities.timestamps.len(), 2);
        assert!(entities.timestamps.iter().any(|t| t.contains("2025-11-24")));
    }

    #[test]
    fn test_url_extraction() {
        let entities =
            extractor().extract("API at https://api.example.com/auth and http://localhost:3000");

        assert!(entities.urls.contains("https://api.example.com/auth"));
        assert!(entities.urls.contains("http://localhost:3000"));
    }

    #[test]
    fn test_ip_address_extraction() {
        let entities = extractor().extract("Server at 192.168.1.100 and 10.0.0.1");

        assert!(entities.ip_addresses.contains("192.168.1.100"));
        assert!(entities.ip_addresses.contains("10.0.0.1"));
    }

    #[test]
    fn test_version_extraction() {
        let entities = extractor().extract("Upgraded to v1.2.3 and 2.0.0-beta");

        assert!(entities.version_numbers.iter().any(|v| v.contains("1.2.3")));
        assert!(entities.version_numbers.iter().any(|v| v.contains("2.0.0")));
    }

    #[test]
    fn test_ip_addresses_are_not_versions() {
        let entities = extractor().extract("Server at 192.168.1.100");

        assert!(entities.ip_addresses.contains("192.168.1.100"));
        assert!(entities.version_numbers.is_empty());
    }

    #[test]
    fn test_hash_extraction() {
        let entities = extractor()
            .extract("Commit abc123def456 and full hash 1234567890abcdef1234567890abcdef12345678");

        assert!(entities.hash_values.contains("abc123def456"));
        assert!(entities.hash_values.iter().any(|h| h.len() == 40));
    }

    #[test]
    fn test_empty_text() {
        let entities = extractor().extract("");
        assert_eq!(entities.count(), 0);
    }

    #[test]
    fn test_plain_text_extracts_little() {
        let entities = extractor().extract("This is just plain text with no technical content");
        assert!(entities.count() <= 5);
    }

    #[test]
    fn test_false_positive_filtering() {
        let entities = extractor().extract("The function is called and will return the value");

        assert!(!entities.function_names.contains("is"));
        assert!(!entities.variable_names.contains("the"));
        assert!(!entities.variable_names.contains("and"));
    }

    #[test]
    fn test_overlapping_identifier_lands_somewhere() {
        let entities = extractor().extract("get_user_info is a function");

        assert!(entities.function_names.len() + entities.variable_names.len() > 0);
    }

    #[test]
    fn test_repeated_content_deduplicates() {
        let long_text = "TypeError in auth.py. ".repeat(1000);

        let entities = extractor().extract(&long_text);

        assert!(entities.error_types.contains("TypeError"));
        assert_eq!(entities.error_types.len(), 1);
    }

    #[test]
    fn test_special_characters_no_crash() {
        let entities = extractor().extract("Error: @user/package#method() failed with $ERROR_CODE");
        // No crash; method() should be visible
        assert!(entities.function_names.contains("method"));
    }

    #[test]
    fn test_unicode_text() {
        let entities = extractor().extract("TypeError in 文件.py: 错误消息");
        assert!(entities.error_types.contains("TypeError"));
    }

    #[test]
    fn test_oversized_input_truncates_without_error() {
        let huge = "TypeError in auth.py ".repeat(10_000);
        let entities = extractor().extract(&huge);
        assert!(entities.error_types.contains("TypeError"));
    }

    #[test]
    fn test_determinism() {
        let text = "TypeError in src/auth.py line 42: validateToken() with JWT_SECRET at 10.0.0.1";
        let a = extractor().extract(text);
        let b = extractor().extract(text);
        assert_eq!(a, b);
    }

    #[test]
    fn test_preservation_across_merge() {
        let ex = extractor();
        let memories = [
            "TypeError in auth.py line 42 with validateToken()",
            "ValueError in main.py with authenticateUser()",
            "Error at https://api.example.com/auth",
        ];

        let all = ExtractedEntities::union_of(ex.extract_batch(&memories).iter());

        assert!(all.error_types.contains("TypeError"));
        assert!(all.error_types.contains("ValueError"));
        assert!(all.function_names.contains("validateToken"));
        assert!(all.function_names.contains("authenticateUser"));
        assert!(all.file_paths.iter().any(|p| p.contains("auth.py")));
        assert!(all.file_paths.iter().any(|p| p.contains("main.py")));
        assert!(all.urls.contains("https://api.example.com/auth"));
        assert!(all.count() >= 7);
    }
}
