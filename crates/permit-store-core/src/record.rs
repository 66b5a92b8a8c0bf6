use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::geo::LatLng;
use crate::StoreError;

time::serde::format_description!(permit_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct PermitId(pub String);

impl PermitId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PermitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One geolocated permit.
///
/// `excluded` and `selected` are derived state owned by the store: they are never
/// read from input and only the store's filter and selection logic mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermitRecord {
    pub id: PermitId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<LatLng>,
    #[serde(default)]
    pub permit_type: Option<String>,
    #[serde(default)]
    pub authority: Option<String>,
    #[serde(default, with = "permit_date::option")]
    pub submitted: Option<Date>,
    #[serde(default)]
    pub area_sqft: Option<f64>,
    #[serde(skip_deserializing, default)]
    excluded: bool,
    #[serde(skip_deserializing, default)]
    selected: bool,
}

impl PermitRecord {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PermitId(id.into()),
            name: None,
            address: None,
            description: None,
            location: None,
            permit_type: None,
            authority: None,
            submitted: None,
            area_sqft: None,
            excluded: false,
            selected: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, lat: f64, lng: f64) -> Self {
        self.location = Some(LatLng::new(lat, lng));
        self
    }

    #[must_use]
    pub fn with_permit_type(mut self, permit_type: impl Into<String>) -> Self {
        self.permit_type = Some(permit_type.into());
        self
    }

    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    #[must_use]
    pub fn with_submitted(mut self, submitted: Date) -> Self {
        self.submitted = Some(submitted);
        self
    }

    #[must_use]
    pub fn with_area_sqft(mut self, area_sqft: f64) -> Self {
        self.area_sqft = Some(area_sqft);
        self
    }

    #[must_use]
    pub fn excluded(&self) -> bool {
        self.excluded
    }

    #[must_use]
    pub fn selected(&self) -> bool {
        self.selected
    }

    pub(crate) fn set_excluded(&mut self, excluded: bool) {
        self.excluded = excluded;
    }

    pub(crate) fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// Resets derived state so an incoming record starts visible and unselected.
    pub(crate) fn reset_derived(&mut self) {
        self.excluded = false;
        self.selected = false;
    }

    /// Validate one incoming permit before it enters a store.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] when the id is blank or the location is
    /// outside valid latitude/longitude ranges.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.0.trim().is_empty() {
            return Err(StoreError::Validation("permit id MUST be non-empty".to_string()));
        }

        if let Some(location) = self.location {
            if !location.is_valid() {
                return Err(StoreError::Validation(format!(
                    "permit {} location MUST be within lat [-90, 90] and lng [-180, 180]",
                    self.id
                )));
            }
        }

        Ok(())
    }

    /// Typed accessor used by sorting and generic predicates.
    #[must_use]
    pub fn field(&self, field: PermitField) -> Option<FieldValue<'_>> {
        match field {
            PermitField::Id => Some(FieldValue::Text(self.id.as_str())),
            PermitField::Name => self.name.as_deref().map(FieldValue::Text),
            PermitField::Address => self.address.as_deref().map(FieldValue::Text),
            PermitField::Description => self.description.as_deref().map(FieldValue::Text),
            PermitField::PermitType => self.permit_type.as_deref().map(FieldValue::Text),
            PermitField::Authority => self.authority.as_deref().map(FieldValue::Text),
            PermitField::Submitted => self.submitted.map(FieldValue::Date),
            PermitField::AreaSqft => {
                self.area_sqft.filter(|value| !value.is_nan()).map(FieldValue::Number)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermitField {
    Id,
    Name,
    Address,
    Description,
    PermitType,
    Authority,
    Submitted,
    AreaSqft,
}

impl PermitField {
    pub const ALL: [Self; 8] = [
        Self::Id,
        Self::Name,
        Self::Address,
        Self::Description,
        Self::PermitType,
        Self::Authority,
        Self::Submitted,
        Self::AreaSqft,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Address => "address",
            Self::Description => "description",
            Self::PermitType => "permit_type",
            Self::Authority => "authority",
            Self::Submitted => "submitted",
            Self::AreaSqft => "area_sqft",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

impl std::str::FromStr for PermitField {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| StoreError::UnknownField(value.to_string()))
    }
}

impl Display for PermitField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Date(Date),
}

impl FieldValue<'_> {
    /// Natural ordering within one value type. Values of different kinds never come
    /// from the same field; they order by kind so the relation stays total. Numbers
    /// compare by value, so `0.0` and `-0.0` are equal.
    #[must_use]
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(lhs), Self::Text(rhs)) => lhs.cmp(rhs),
            (Self::Number(lhs), Self::Number(rhs)) => {
                lhs.partial_cmp(rhs).unwrap_or(Ordering::Equal)
            }
            (Self::Date(lhs), Self::Date(rhs)) => lhs.cmp(rhs),
            (lhs, rhs) => lhs.kind_rank().cmp(&rhs.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Text(_) => 0,
            Self::Number(_) => 1,
            Self::Date(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn derived_flags_are_not_read_from_input() {
        let json = r#"{"id":"P-1","description":"Deck","excluded":true,"selected":true}"#;
        let record: PermitRecord = match serde_json::from_str(json) {
            Ok(record) => record,
            Err(err) => panic!("record should deserialize: {err}"),
        };
        assert!(!record.excluded());
        assert!(!record.selected());
        assert_eq!(record.description.as_deref(), Some("Deck"));
    }

    #[test]
    fn submitted_date_uses_calendar_format() {
        let json = r#"{"id":"P-2","submitted":"2014-03-07"}"#;
        let record: PermitRecord = match serde_json::from_str(json) {
            Ok(record) => record,
            Err(err) => panic!("record should deserialize: {err}"),
        };
        assert_eq!(record.submitted, Some(date!(2014 - 03 - 07)));

        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(err) => panic!("record should serialize: {err}"),
        };
        assert_eq!(value["submitted"], "2014-03-07");
    }

    #[test]
    fn validate_rejects_blank_id() {
        let record = PermitRecord::new("  ");
        match record.validate() {
            Err(StoreError::Validation(message)) => assert!(message.contains("id")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_out_of_range_location() {
        let record = PermitRecord::new("P-3").with_location(91.0, 0.0);
        assert!(matches!(record.validate(), Err(StoreError::Validation(_))));
        assert!(PermitRecord::new("P-3").with_location(42.0, -71.0).validate().is_ok());
    }

    #[test]
    fn field_accessor_reports_nan_as_absent() {
        let record = PermitRecord::new("P-4").with_area_sqft(f64::NAN);
        assert_eq!(record.field(PermitField::AreaSqft), None);
        assert_eq!(record.field(PermitField::Name), None);
        assert_eq!(record.field(PermitField::Id), Some(FieldValue::Text("P-4")));
    }

    #[test]
    fn field_names_round_trip_through_parse() {
        for field in PermitField::ALL {
            assert_eq!(PermitField::parse(field.as_str()), Some(field));
        }
        assert!(matches!("height".parse::<PermitField>(), Err(StoreError::UnknownField(_))));
    }

    #[test]
    fn natural_cmp_orders_each_kind() {
        assert_eq!(FieldValue::Text("a").natural_cmp(&FieldValue::Text("b")), Ordering::Less);
        assert_eq!(FieldValue::Number(2.0).natural_cmp(&FieldValue::Number(1.5)), Ordering::Greater);
        assert_eq!(
            FieldValue::Date(date!(2020 - 01 - 01)).natural_cmp(&FieldValue::Date(date!(2020 - 01 - 01))),
            Ordering::Equal
        );
    }
}
