use crate::error::{H2SimError, Result};

pub fn check_open_unit(value: f64, name: &str) -> Result<()> {
    check_finite(value, name)?;
    if value <= 0.0 || value >= 1.0 {
        return Err(H2SimError::InvalidArgument(format!(
            "Value of {name} should lie strictly between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

pub fn check_proportion(value: f64, name: &str) -> Result<()> {
    check_finite(value, name)?;
    if value <= 0.0 || value > 1.0 {
        return Err(H2SimError::InvalidArgument(format!(
            "Value of {name} should be above 0 and at most 1, got {value}"
        )));
    }
    Ok(())
}

pub fn check_non_negative(value: f64, name: &str) -> Result<()> {
    check_finite(value, name)?;
    if value < 0.0 {
        return Err(H2SimError::InvalidArgument(format!(
            "Value of {name} should not be negative, got {value}"
        )));
    }
    Ok(())
}

pub fn check_positive_count(value: usize, name: &str) -> Result<()> {
    if value == 0 {
        return Err(H2SimError::InvalidArgument(format!(
            "Value of {name} should be at least 1"
        )));
    }
    Ok(())
}

fn check_finite(value: f64, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(H2SimError::InvalidArgument(format!(
            "Value of {name} should be finite"
        )));
    }
    Ok(())
}
