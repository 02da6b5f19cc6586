use crate::error::{ArchiveError, Result};

/// Frozen extraction configuration, threaded by reference through the whole
/// pipeline. Immutable once built: only [`SecurityPolicyBuilder`] can
/// produce one, and `build()` validates every field.
///
/// `PathTraversal`, `SymlinkEscape` and `HardlinkEscape` are raised
/// regardless of these settings — this policy tunes *resource* limits, not
/// *containment* limits. See [`crate::validator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicy {
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub max_compression_ratio: f64,
    pub max_file_count: u64,
    pub max_path_length: usize,
    pub max_path_depth: usize,
    pub allow_symlinks: bool,
    pub allow_hardlinks: bool,
    pub preserve_permissions: bool,
    pub allowed_extensions: Vec<String>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        SecurityPolicy::default_builder()
            .build()
            .expect("default policy is always valid")
    }
}

impl SecurityPolicy {
    /// Conservative defaults: 50 MiB per file, 500 MiB total, 100x
    /// compression ratio, 10k entries.
    pub fn default() -> Self {
        Default::default()
    }

    /// Raises size/count limits by roughly 10x and enables
    /// `preserve_permissions`, but leaves `allow_symlinks`, `allow_hardlinks`
    /// and all containment checks at their strict defaults. Permissive tunes
    /// resource ceilings, never containment.
    pub fn permissive() -> Self {
        SecurityPolicyBuilder::new()
            .max_file_size(500 * 1024 * 1024)
            .max_total_size(5 * 1024 * 1024 * 1024)
            .max_compression_ratio(1000.0)
            .max_file_count(100_000)
            .preserve_permissions(true)
            .build()
            .expect("permissive policy is always valid")
    }

    /// Shrinks the default limits for untrusted or low-resource contexts.
    pub fn strict() -> Self {
        SecurityPolicyBuilder::new()
            .max_file_size(10 * 1024 * 1024)
            .max_total_size(100 * 1024 * 1024)
            .max_compression_ratio(50.0)
            .max_file_count(1_000)
            .build()
            .expect("strict policy is always valid")
    }

    fn default_builder() -> SecurityPolicyBuilder {
        SecurityPolicyBuilder::new()
    }

    pub fn builder() -> SecurityPolicyBuilder {
        SecurityPolicyBuilder::new()
    }

    /// Whether `extension` (without leading dot) is permitted by
    /// `allowed_extensions`. An empty allow-list means unrestricted.
    pub(crate) fn extension_allowed(&self, extension: Option<&str>) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        match extension {
            Some(ext) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Fluent, validating builder for [`SecurityPolicy`].
///
/// Every setter just stores the value; validation is deferred to
/// [`SecurityPolicyBuilder::build`], which fails fast on the first
/// violated invariant (non-finite numbers, zero ratio, null bytes in
/// strings).
#[derive(Debug, Clone)]
pub struct SecurityPolicyBuilder {
    max_file_size: u64,
    max_total_size: u64,
    max_compression_ratio: f64,
    max_file_count: u64,
    max_path_length: usize,
    max_path_depth: usize,
    allow_symlinks: bool,
    allow_hardlinks: bool,
    preserve_permissions: bool,
    allowed_extensions: Vec<String>,
}

impl Default for SecurityPolicyBuilder {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_total_size: 500 * 1024 * 1024,
            max_compression_ratio: 100.0,
            max_file_count: 10_000,
            max_path_length: 4_096,
            max_path_depth: 64,
            allow_symlinks: false,
            allow_hardlinks: false,
            preserve_permissions: false,
            allowed_extensions: Vec::new(),
        }
    }
}

impl SecurityPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    pub fn max_compression_ratio(mut self, ratio: f64) -> Self {
        self.max_compression_ratio = ratio;
        self
    }

    pub fn max_file_count(mut self, count: u64) -> Self {
        self.max_file_count = count;
        self
    }

    pub fn max_path_length(mut self, chars: usize) -> Self {
        self.max_path_length = chars;
        self
    }

    pub fn max_path_depth(mut self, components: usize) -> Self {
        self.max_path_depth = components;
        self
    }

    pub fn allow_symlinks(mut self, allow: bool) -> Self {
        self.allow_symlinks = allow;
        self
    }

    pub fn allow_hardlinks(mut self, allow: bool) -> Self {
        self.allow_hardlinks = allow;
        self
    }

    pub fn preserve_permissions(mut self, preserve: bool) -> Self {
        self.preserve_permissions = preserve;
        self
    }

    pub fn allowed_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.allowed_extensions = extensions.into_iter().collect();
        self
    }

    /// Validates every field and produces an immutable [`SecurityPolicy`].
    pub fn build(self) -> Result<SecurityPolicy> {
        if !self.max_compression_ratio.is_finite() || self.max_compression_ratio <= 0.0 {
            return Err(ArchiveError::InvalidPolicy(
                "max_compression_ratio must be finite and > 0",
            ));
        }
        if self.max_path_depth == 0 {
            return Err(ArchiveError::InvalidPolicy(
                "max_path_depth must be at least 1",
            ));
        }
        if self.max_path_length == 0 {
            return Err(ArchiveError::InvalidPolicy(
                "max_path_length must be at least 1",
            ));
        }
        for ext in &self.allowed_extensions {
            if ext.contains('\0') {
                return Err(ArchiveError::InvalidPolicy(
                    "allowed_extensions entries must not contain null bytes",
                ));
            }
        }

        Ok(SecurityPolicy {
            max_file_size: self.max_file_size,
            max_total_size: self.max_total_size,
            max_compression_ratio: self.max_compression_ratio,
            max_file_count: self.max_file_count,
            max_path_length: self.max_path_length,
            max_path_depth: self.max_path_depth,
            allow_symlinks: self.allow_symlinks,
            allow_hardlinks: self.allow_hardlinks,
            preserve_permissions: self.preserve_permissions,
            allowed_extensions: self.allowed_extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_documented_defaults() {
        let policy = SecurityPolicy::default();
        assert_eq!(policy.max_file_size, 50 * 1024 * 1024);
        assert_eq!(policy.max_total_size, 500 * 1024 * 1024);
        assert_eq!(policy.max_compression_ratio, 100.0);
        assert_eq!(policy.max_file_count, 10_000);
        assert_eq!(policy.max_path_length, 4_096);
        assert_eq!(policy.max_path_depth, 64);
        assert!(!policy.allow_symlinks);
        assert!(!policy.allow_hardlinks);
        assert!(!policy.preserve_permissions);
    }

    #[test]
    fn permissive_raises_limits_but_not_containment() {
        let policy = SecurityPolicy::permissive();
        assert!(policy.max_file_size > SecurityPolicy::default().max_file_size);
        assert!(policy.preserve_permissions);
        assert!(!policy.allow_symlinks);
        assert!(!policy.allow_hardlinks);
    }

    #[test]
    fn strict_shrinks_limits() {
        let policy = SecurityPolicy::strict();
        assert!(policy.max_file_size < SecurityPolicy::default().max_file_size);
        assert!(policy.max_file_count < SecurityPolicy::default().max_file_count);
    }

    #[test]
    fn zero_compression_ratio_rejected() {
        let err = SecurityPolicyBuilder::new()
            .max_compression_ratio(0.0)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn non_finite_compression_ratio_rejected() {
        let err = SecurityPolicyBuilder::new()
            .max_compression_ratio(f64::INFINITY)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn null_byte_extension_rejected() {
        let err = SecurityPolicyBuilder::new()
            .allowed_extensions(vec!["txt\0".to_string()])
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn extension_allowlist_is_case_insensitive() {
        let policy = SecurityPolicyBuilder::new()
            .allowed_extensions(vec!["TXT".to_string()])
            .build()
            .unwrap();
        assert!(policy.extension_allowed(Some("txt")));
        assert!(!policy.extension_allowed(Some("exe")));
        assert!(!policy.extension_allowed(None));
    }

    #[test]
    fn empty_allowlist_is_unrestricted() {
        let policy = SecurityPolicy::default();
        assert!(policy.extension_allowed(Some("anything")));
        assert!(policy.extension_allowed(None));
    }
}
