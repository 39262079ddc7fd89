//! Common helper functions for WGSL shader generation

use crate::dtype::ScalarType;
use crate::error::{Error, Result};

/// WGSL type name for a given ScalarType
#[inline]
pub fn wgsl_type(ty: ScalarType) -> &'static str {
    ty.wgsl_name()
}

/// Enable directives a module over `ty` must start with
pub fn module_header(ty: ScalarType) -> String {
    match ty.enable_directive() {
        Some(directive) => format!("{directive}\n"),
        None => String::new(),
    }
}

/// Check that `value` is a non-zero power of two
pub fn check_power_of_two(field: &'static str, value: u32) -> Result<()> {
    if value == 0 || !value.is_power_of_two() {
        return Err(Error::configuration(
            field,
            format!("{value} is not a power of two"),
        ));
    }
    Ok(())
}

/// Check that `name` can be spliced into a WGSL identifier
pub fn check_identifier(field: &'static str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::configuration(
            field,
            format!("'{name}' is not a valid WGSL identifier"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two() {
        assert!(check_power_of_two("workgroup_size", 256).is_ok());
        assert!(check_power_of_two("workgroup_size", 1).is_ok());
        assert!(check_power_of_two("workgroup_size", 0).is_err());
        assert!(check_power_of_two("workgroup_size", 96).is_err());
    }

    #[test]
    fn test_identifier() {
        assert!(check_identifier("combine_op_name", "add").is_ok());
        assert!(check_identifier("combine_op_name", "_min2").is_ok());
        assert!(check_identifier("combine_op_name", "").is_err());
        assert!(check_identifier("combine_op_name", "2add").is_err());
        assert!(check_identifier("combine_op_name", "a+b").is_err());
    }

    #[test]
    fn test_module_header() {
        assert_eq!(module_header(ScalarType::F32), "");
        assert_eq!(module_header(ScalarType::F16), "enable f16;\n");
    }
}
