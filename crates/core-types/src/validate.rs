use crate::error::CoreError;
use crate::structs::PhysicalClusters;

/// Separator used when a physical cluster set is stored as a single string.
/// It is therefore forbidden inside physical cluster names.
pub const PHYSICAL_DELIMITER: char = ',';

/// Checks that a record key is usable. Any non-empty string is.
pub fn validate_name(field: &str, name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::InvalidInput(field.to_string(), "must not be empty".to_string()));
    }
    Ok(())
}

/// Checks a physical cluster set before it is joined for storage.
pub fn validate_physical_clusters(physics: &PhysicalClusters) -> Result<(), CoreError> {
    if physics.is_empty() {
        return Err(CoreError::InvalidInput(
            "physical clusters".to_string(),
            "at least one physical cluster is required".to_string(),
        ));
    }
    for name in physics {
        validate_name("physical cluster", name)?;
        if name.contains(PHYSICAL_DELIMITER) {
            return Err(CoreError::InvalidInput(
                "physical cluster".to_string(),
                format!("'{name}' contains the reserved '{PHYSICAL_DELIMITER}' character"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> PhysicalClusters {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_any_non_empty_name() {
        assert!(validate_name("cluster", "").is_err());
        assert!(validate_name("cluster", " prod").is_ok());
        assert!(validate_name("cluster", "prod ").is_ok());
        assert!(validate_name("cluster", "prod").is_ok());
    }

    #[test]
    fn rejects_delimiter_inside_physical_name() {
        let err = validate_physical_clusters(&set(&["p1", "p2,p3"])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "physical cluster"));
    }

    #[test]
    fn rejects_empty_set() {
        assert!(validate_physical_clusters(&PhysicalClusters::new()).is_err());
        assert!(validate_physical_clusters(&set(&["p1", "p2"])).is_ok());
    }
}
