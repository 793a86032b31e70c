//! Parse-time toggles for [`crate::pe::Image::parse_with`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Whether to walk and parse the attribute certificate table.
    ///
    /// On-disk views want this; in-memory/loaded views should skip it, since
    /// the Windows loader never maps the certificate table into memory.
    /// Default: `true`.
    pub parse_attribute_certificates: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            parse_attribute_certificates: true,
        }
    }
}
