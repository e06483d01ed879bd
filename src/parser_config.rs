/// Parser options for controlling error recovery and resource limits.
///
/// These options trade strict compliance for compatibility with the many
/// malformed files found in the wild. The default is lenient.
///
/// # Example
///
/// ```
/// use pdf_lexis::parser_config::ParserOptions;
///
/// // Strict mode - no heuristics for missing keywords
/// let strict = ParserOptions::strict();
/// assert!(!strict.allow_missing_endobj);
///
/// // Custom configuration
/// let custom = ParserOptions {
///     trust_stream_lengths: false,
///     ..ParserOptions::lenient()
/// };
/// assert!(custom.allow_missing_endobj);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fail on structural violations instead of recovering
    pub strict: bool,

    /// Accept objects that end without an `endobj` keyword
    ///
    /// Covers three shapes: a stream followed directly by the next object,
    /// a dictionary or array followed directly by the next object, and an
    /// object cut off by the end of input.
    pub allow_missing_endobj: bool,

    /// Use the declared `/Length` of streams on random-access inputs
    ///
    /// When false every stream payload is located by scanning for the
    /// `endstream` keyword.
    pub trust_stream_lengths: bool,

    /// Maximum array/dictionary nesting depth
    ///
    /// Deeper nesting is treated as a malformed object.
    pub max_nesting: usize,

    /// Maximum number of cross-reference sections followed through `/Prev`
    pub max_xref_chain: usize,

    /// Maximum number of nested lazy object fetches
    pub max_recursion_depth: u32,

    /// Maximum decoded size of cross-reference and object streams in bytes
    ///
    /// Set to 0 to disable the check.
    pub max_decompressed_size: usize,

    /// Rebuild the cross-reference table by scanning when it cannot be read
    pub reconstruct_on_failure: bool,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: no recovery heuristics
    ///
    /// Use this for validating files or when parsing trusted inputs.
    pub fn strict() -> Self {
        Self {
            strict: true,
            allow_missing_endobj: false,
            trust_stream_lengths: true,
            max_nesting: 100,
            max_xref_chain: 100,
            max_recursion_depth: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            reconstruct_on_failure: false,
        }
    }

    /// Lenient mode: recover from malformed input wherever possible
    pub fn lenient() -> Self {
        Self {
            strict: false,
            allow_missing_endobj: true,
            trust_stream_lengths: true,
            max_nesting: 100,
            max_xref_chain: 100,
            max_recursion_depth: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            reconstruct_on_failure: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mode() {
        let opts = ParserOptions::strict();
        assert!(opts.strict);
        assert!(!opts.allow_missing_endobj);
        assert!(!opts.reconstruct_on_failure);
    }

    #[test]
    fn test_lenient_mode() {
        let opts = ParserOptions::lenient();
        assert!(!opts.strict);
        assert!(opts.allow_missing_endobj);
        assert!(opts.trust_stream_lengths);
        assert!(opts.reconstruct_on_failure);
    }

    #[test]
    fn test_default_is_lenient() {
        assert_eq!(ParserOptions::default(), ParserOptions::lenient());
    }
}
