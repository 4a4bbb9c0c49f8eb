//! Result type alias for SafeHarbor

use super::errors::DeidError;

/// Result type alias for SafeHarbor operations
///
/// # Examples
///
/// ```
/// use safeharbor::domain::result::Result;
/// use safeharbor::domain::errors::DeidError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(DeidError::Configuration("merge_threshold out of range".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, DeidError>;
