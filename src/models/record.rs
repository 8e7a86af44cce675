use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// A stored record: the form data plus the key the store assigned to it.
///
/// The key is not part of the stored value; it is the name of the node the
/// value lives under, and is attached when a snapshot is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Record<T> {
    pub fn new(id: impl Into<String>, data: T) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T: fmt::Display> fmt::Display for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.id)?;
        write!(f, "{}", self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CropFormData, CropStatus};

    #[test]
    fn test_record_flattens_fields_next_to_id() {
        let record = Record::new(
            "k1",
            CropFormData::new("Wheat", "Durum").with_status(CropStatus::Growing),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "k1");
        assert_eq!(json["name"], "Wheat");
        assert_eq!(json["status"], "growing");
    }

    #[test]
    fn test_record_derefs_to_data() {
        let record = Record::new("k1", CropFormData::new("Rice", "Basmati"));
        assert_eq!(record.name, "Rice");
        assert_eq!(record.into_data().variety, "Basmati");
    }
}
