//! Feature schema for the churn model.
//!
//! The table at the bottom of this file is the single source of truth for
//! the request record: it generates [`ChurnFeatureRecord`], the
//! wire-name → model-column mapping ([`FEATURE_FIELDS`]) and the conversion
//! into a [`FeatureRow`]. Wire names are valid identifiers; model column
//! names are whatever the trained pipeline saw (spaces, `&`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Number of features the model consumes.
pub const FEATURE_COUNT: usize = 29;

// =============================================================================
// Field kinds and values
// =============================================================================

/// Primitive type of a feature field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Float,
    Integer,
    Boolean,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Float => write!(f, "float"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Boolean => write!(f, "boolean"),
        }
    }
}

/// A single typed feature value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
}

impl FeatureValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FeatureValue::Float(_) => FieldKind::Float,
            FeatureValue::Integer(_) => FieldKind::Integer,
            FeatureValue::Boolean(_) => FieldKind::Boolean,
        }
    }

    /// Numeric value as fed to the model (booleans become 0.0 / 1.0).
    pub fn as_f64(&self) -> f64 {
        match *self {
            FeatureValue::Float(v) => v,
            FeatureValue::Integer(v) => v as f64,
            FeatureValue::Boolean(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Rust types allowed in the feature table.
pub trait FeatureType: Copy {
    const KIND: FieldKind;
    fn into_value(self) -> FeatureValue;
}

impl FeatureType for f64 {
    const KIND: FieldKind = FieldKind::Float;
    fn into_value(self) -> FeatureValue {
        FeatureValue::Float(self)
    }
}

impl FeatureType for i64 {
    const KIND: FieldKind = FieldKind::Integer;
    fn into_value(self) -> FeatureValue {
        FeatureValue::Integer(self)
    }
}

impl FeatureType for bool {
    const KIND: FieldKind = FieldKind::Boolean;
    fn into_value(self) -> FeatureValue {
        FeatureValue::Boolean(self)
    }
}

/// One entry of the wire → model column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureField {
    /// Name used in the JSON request body.
    pub wire: &'static str,
    /// Column name the trained model expects.
    pub column: &'static str,
    pub kind: FieldKind,
}

// =============================================================================
// Feature row
// =============================================================================

/// One model input row, keyed by model column name.
///
/// Insertion order is preserved so that backends which consume positional
/// tensors see columns in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureRow {
    values: IndexMap<&'static str, FeatureValue>,
}

impl FeatureRow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert a column, returning the previous value if the column was
    /// already present.
    pub fn insert(&mut self, column: &'static str, value: FeatureValue) -> Option<FeatureValue> {
        self.values.insert(column, value)
    }

    pub fn get(&self, column: &str) -> Option<FeatureValue> {
        self.values.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }
}

// =============================================================================
// Lookups
// =============================================================================

/// Find a field by its wire name.
pub fn field_by_wire(wire: &str) -> Option<&'static FeatureField> {
    FEATURE_FIELDS.iter().find(|f| f.wire == wire)
}

/// Model column name for a wire name.
pub fn column_for_wire(wire: &str) -> Option<&'static str> {
    field_by_wire(wire).map(|f| f.column)
}

/// Model column names in schema order.
pub fn model_columns() -> impl Iterator<Item = &'static str> {
    FEATURE_FIELDS.iter().map(|f| f.column)
}

// =============================================================================
// Schema table
// =============================================================================

macro_rules! feature_schema {
    ($( $wire:ident : $ty:ty => $column:literal ),+ $(,)?) => {
        /// A validated churn feature record, as received on the wire.
        ///
        /// Every field is required. Field names are the wire names.
        #[allow(non_snake_case)]
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct ChurnFeatureRecord {
            $( pub $wire: $ty, )+
        }

        /// Wire name → model column mapping, in schema order.
        pub const FEATURE_FIELDS: &[FeatureField] = &[
            $(
                FeatureField {
                    wire: stringify!($wire),
                    column: $column,
                    kind: <$ty as FeatureType>::KIND,
                },
            )+
        ];

        impl ChurnFeatureRecord {
            /// Rename the record into the model's column names.
            pub fn to_feature_row(&self) -> FeatureRow {
                let mut row = FeatureRow::with_capacity(FEATURE_COUNT);
                $( row.insert($column, FeatureType::into_value(self.$wire)); )+
                row
            }
        }
    };
}

feature_schema! {
    Tenure: f64 => "Tenure",
    CityTier: i64 => "CityTier",
    WarehouseToHome: f64 => "WarehouseToHome",
    HourSpendOnApp: f64 => "HourSpendOnApp",
    NumberOfDeviceRegistered: i64 => "NumberOfDeviceRegistered",
    SatisfactionScore: i64 => "SatisfactionScore",
    NumberOfAddress: i64 => "NumberOfAddress",
    Complain: i64 => "Complain",
    OrderAmountHikeFromlastYear: f64 => "OrderAmountHikeFromlastYear",
    CouponUsed: f64 => "CouponUsed",
    OrderCount: f64 => "OrderCount",
    DaySinceLastOrder: f64 => "DaySinceLastOrder",
    CashbackAmount: f64 => "CashbackAmount",

    PreferredLoginDevice_Mobile_Phone: bool => "PreferredLoginDevice_Mobile Phone",
    PreferredLoginDevice_Phone: bool => "PreferredLoginDevice_Phone",
    PreferredPaymentMode_COD: bool => "PreferredPaymentMode_COD",
    PreferredPaymentMode_Cash_on_Delivery: bool => "PreferredPaymentMode_Cash on Delivery",
    PreferredPaymentMode_Credit_Card: bool => "PreferredPaymentMode_Credit Card",
    PreferredPaymentMode_Debit_Card: bool => "PreferredPaymentMode_Debit Card",
    PreferredPaymentMode_E_wallet: bool => "PreferredPaymentMode_E wallet",
    PreferredPaymentMode_UPI: bool => "PreferredPaymentMode_UPI",
    Gender_Male: bool => "Gender_Male",
    PreferedOrderCat_Grocery: bool => "PreferedOrderCat_Grocery",
    PreferedOrderCat_Laptop_and_Accessory: bool => "PreferedOrderCat_Laptop & Accessory",
    PreferedOrderCat_Mobile: bool => "PreferedOrderCat_Mobile",
    PreferedOrderCat_Mobile_Phone: bool => "PreferedOrderCat_Mobile Phone",
    PreferedOrderCat_Others: bool => "PreferedOrderCat_Others",
    MaritalStatus_Married: bool => "MaritalStatus_Married",
    MaritalStatus_Single: bool => "MaritalStatus_Single",
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_has_expected_size() {
        assert_eq!(FEATURE_FIELDS.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_wire_names_unique() {
        let wires: HashSet<_> = FEATURE_FIELDS.iter().map(|f| f.wire).collect();
        assert_eq!(wires.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_column_names_unique() {
        let columns: HashSet<_> = FEATURE_FIELDS.iter().map(|f| f.column).collect();
        assert_eq!(columns.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_kind_counts() {
        let count = |k: FieldKind| FEATURE_FIELDS.iter().filter(|f| f.kind == k).count();
        assert_eq!(count(FieldKind::Float), 8);
        assert_eq!(count(FieldKind::Integer), 5);
        assert_eq!(count(FieldKind::Boolean), 16);
    }

    #[test]
    fn test_renamed_columns() {
        assert_eq!(
            column_for_wire("PreferredLoginDevice_Mobile_Phone"),
            Some("PreferredLoginDevice_Mobile Phone")
        );
        assert_eq!(
            column_for_wire("PreferedOrderCat_Laptop_and_Accessory"),
            Some("PreferedOrderCat_Laptop & Accessory")
        );
        assert_eq!(
            column_for_wire("PreferredPaymentMode_Cash_on_Delivery"),
            Some("PreferredPaymentMode_Cash on Delivery")
        );
        assert_eq!(
            column_for_wire("PreferredPaymentMode_E_wallet"),
            Some("PreferredPaymentMode_E wallet")
        );
        assert_eq!(column_for_wire("Tenure"), Some("Tenure"));
        assert_eq!(column_for_wire("Nope"), None);
    }

    #[test]
    fn test_lookup_round_trip() {
        for field in FEATURE_FIELDS {
            assert_eq!(field_by_wire(field.wire), Some(field));
        }
    }

    #[test]
    fn test_column_names_have_no_underscore_substitutes() {
        // Columns keep the spaces and ampersands the pipeline was trained on
        for field in FEATURE_FIELDS {
            assert!(!field.column.contains("_and_"), "{}", field.column);
            assert!(!field.wire.contains(' ') && !field.wire.contains('&'));
        }
    }

    #[test]
    fn test_feature_value_as_f64() {
        assert_eq!(FeatureValue::Float(2.5).as_f64(), 2.5);
        assert_eq!(FeatureValue::Integer(3).as_f64(), 3.0);
        assert_eq!(FeatureValue::Boolean(true).as_f64(), 1.0);
        assert_eq!(FeatureValue::Boolean(false).as_f64(), 0.0);
    }

    #[test]
    fn test_feature_row_preserves_order() {
        let mut row = FeatureRow::default();
        row.insert("b", FeatureValue::Integer(1));
        row.insert("a", FeatureValue::Integer(2));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(FeatureValue::Integer(1)));
        assert_eq!(row.len(), 2);
        assert!(!row.contains("c"));
    }
}
