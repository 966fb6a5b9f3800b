//! Catalog -> schema -> table selection state.
//!
//! Pure state machine with no I/O. The session feeds it listings fetched
//! through the warehouse and asks it which entry to pre-select.

use crate::config::SessionConfig;
use crate::error::TollgateError;
use crate::models::QualifiedName;

/// Preferred names to pre-select at each level, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPreferences {
    /// Catalog preferences
    pub catalogs: Vec<String>,
    /// Schema preferences
    pub schemas: Vec<String>,
    /// Table preferences
    pub tables: Vec<String>,
}

impl SelectionPreferences {
    /// Read preferences from session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            catalogs: config.preferred_catalogs.clone(),
            schemas: config.preferred_schemas.clone(),
            tables: config.preferred_tables.clone(),
        }
    }
}

/// Pick the entry to pre-select: the first preferred name present in
/// `options`, else the first option, else nothing.
pub fn default_selection<'a>(options: &'a [String], preferred: &[String]) -> Option<&'a str> {
    preferred
        .iter()
        .find_map(|p| options.iter().find(|o| *o == p))
        .or_else(|| options.first())
        .map(String::as_str)
}

/// Current selection and cached listings.
///
/// `schema` is set only when `catalog` is, and `table` only when `schema` is.
/// A failed listing leaves its list empty and keeps the error message until
/// the next successful listing or selection change at that level.
#[derive(Debug, Clone, Default)]
pub struct BrowseState {
    catalog: Option<String>,
    schema: Option<String>,
    table: Option<String>,
    schema_options: Vec<String>,
    table_options: Vec<String>,
    schema_error: Option<String>,
    table_error: Option<String>,
    preferences: SelectionPreferences,
}

impl BrowseState {
    /// Create an empty state with the given preferences.
    pub fn new(preferences: SelectionPreferences) -> Self {
        Self { preferences, ..Self::default() }
    }

    /// Forget every selection and listing.
    pub fn reset(&mut self) {
        self.catalog = None;
        self.clear_below_catalog();
    }

    /// Select a catalog, clearing schema, table and both listings.
    pub fn select_catalog(&mut self, name: impl Into<String>) {
        self.catalog = Some(name.into());
        self.clear_below_catalog();
    }

    /// Select a schema, clearing the table and table listing.
    ///
    /// Requires a selected catalog.
    pub fn select_schema(&mut self, name: impl Into<String>) -> Result<(), TollgateError> {
        if self.catalog.is_none() {
            return Err(TollgateError::precondition("Select a catalog before a schema"));
        }
        self.schema = Some(name.into());
        self.clear_below_schema();
        Ok(())
    }

    /// Select a table. Requires a selected schema.
    pub fn select_table(&mut self, name: impl Into<String>) -> Result<(), TollgateError> {
        if self.schema.is_none() {
            return Err(TollgateError::precondition("Select a schema before a table"));
        }
        self.table = Some(name.into());
        Ok(())
    }

    /// Install the schema listing for the selected catalog.
    pub fn set_schema_options(&mut self, options: Vec<String>) {
        self.schema_options = options;
        self.schema_error = None;
    }

    /// Install the table listing for the selected schema.
    pub fn set_table_options(&mut self, options: Vec<String>) {
        self.table_options = options;
        self.table_error = None;
    }

    /// Record a failed schema listing.
    pub fn schema_listing_failed(&mut self, message: impl Into<String>) {
        self.schema_options.clear();
        self.schema_error = Some(message.into());
    }

    /// Record a failed table listing.
    pub fn table_listing_failed(&mut self, message: impl Into<String>) {
        self.table_options.clear();
        self.table_error = Some(message.into());
    }

    /// Default catalog among `catalogs`.
    pub fn default_catalog<'a>(&self, catalogs: &'a [String]) -> Option<&'a str> {
        default_selection(catalogs, &self.preferences.catalogs)
    }

    /// Default schema among the cached listing.
    pub fn default_schema(&self) -> Option<String> {
        default_selection(&self.schema_options, &self.preferences.schemas).map(String::from)
    }

    /// Default table among the cached listing.
    pub fn default_table(&self) -> Option<String> {
        default_selection(&self.table_options, &self.preferences.tables).map(String::from)
    }

    /// Selected catalog.
    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    /// Selected schema.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Selected table.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Cached schema listing.
    pub fn schema_options(&self) -> &[String] {
        &self.schema_options
    }

    /// Cached table listing.
    pub fn table_options(&self) -> &[String] {
        &self.table_options
    }

    /// Why the schema listing is empty, if it failed.
    pub fn schema_error(&self) -> Option<&str> {
        self.schema_error.as_deref()
    }

    /// Why the table listing is empty, if it failed.
    pub fn table_error(&self) -> Option<&str> {
        self.table_error.as_deref()
    }

    /// Fully qualified selection, if all three levels are chosen.
    pub fn qualified_table(&self) -> Option<QualifiedName> {
        match (&self.catalog, &self.schema, &self.table) {
            (Some(c), Some(s), Some(t)) => Some(QualifiedName::new(c, s, t)),
            _ => None,
        }
    }

    fn clear_below_catalog(&mut self) {
        self.schema = None;
        self.schema_options.clear();
        self.schema_error = None;
        self.clear_below_schema();
    }

    fn clear_below_schema(&mut self) {
        self.table = None;
        self.table_options.clear();
        self.table_error = None;
    }
}
