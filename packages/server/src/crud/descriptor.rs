//! Declarative description of how one entity type is listed and edited.
//!
//! Descriptors are plain data. The list and edit controllers read them and
//! never look at the concrete entity type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Per-entity actions guarded by `{prefix}.{ability}` permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    ViewAny,
    Create,
    Update,
    Delete,
}

impl Ability {
    pub const ALL: [Ability; 4] = [Self::ViewAny, Self::Create, Self::Update, Self::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewAny => "viewAny",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub code: String,
    pub name: String,
}

impl Locale {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Plain,
    Badge,
    Image,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor {
    #[default]
    Gray,
    Green,
    Red,
    Yellow,
    Blue,
    Indigo,
    Purple,
}

/// Badge colours keyed by the raw column value. `true`, `"draft"` and
/// `null` are all valid keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorMap(Vec<(Value, BadgeColor)>);

impl ColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<Value>, color: BadgeColor) -> Self {
        self.0.push((key.into(), color));
        self
    }

    pub fn color_for(&self, value: &Value) -> BadgeColor {
        self.0
            .iter()
            .find(|(key, _)| key == value)
            .map(|(_, color)| *color)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: String,
    pub label: String,
    pub sortable: bool,
    pub kind: ColumnType,
    pub color_map: Option<ColorMap>,
    /// `{key}` placeholders substituted from the row; wins over `kind`.
    pub template: Option<String>,
}

impl Column {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            sortable: false,
            kind: ColumnType::Plain,
            color_map: None,
            template: None,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn badge(mut self, colors: ColorMap) -> Self {
        self.kind = ColumnType::Badge;
        self.color_map = Some(colors);
        self
    }

    pub fn image(mut self) -> Self {
        self.kind = ColumnType::Image;
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Password,
    Email,
    Number,
    Checkbox,
    Select,
    Multiselect,
    FileUpload,
    Circular,
    Editor,
}

impl FieldType {
    pub fn is_file(self) -> bool {
        matches!(self, Self::FileUpload | Self::Circular)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: Value,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub label: String,
    pub kind: FieldType,
    pub translatable: bool,
    /// `false` marks write-only inputs such as password confirmations.
    pub persist: bool,
    /// Many-to-many relation synced from the submitted ids.
    pub relationship: Option<String>,
    /// Relation or lookup providing choices without syncing anything.
    pub options_from: Option<String>,
    pub options: Vec<SelectOption>,
    pub column_span: u8,
    pub default: Option<Value>,
    /// Attachment collection for file fields; defaults to the field name.
    pub collection: Option<String>,
    pub multiple: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            translatable: false,
            persist: true,
            relationship: None,
            options_from: None,
            options: Vec::new(),
            column_span: 12,
            default: None,
            collection: None,
            multiple: false,
        }
    }

    pub fn translatable(mut self) -> Self {
        self.translatable = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn relationship(mut self, relation: impl Into<String>) -> Self {
        self.relationship = Some(relation.into());
        self
    }

    pub fn options_from(mut self, source: impl Into<String>) -> Self {
        self.options_from = Some(source.into());
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = SelectOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    pub fn span(mut self, columns: u8) -> Self {
        self.column_span = columns.clamp(1, 12);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn collection_name(&self) -> &str {
        self.collection.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Select,
    Boolean,
    Date,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub label: String,
    pub kind: FilterType,
    pub options: Vec<SelectOption>,
    /// Match through the relation named `field` instead of a column.
    pub is_relationship: bool,
}

impl Filter {
    pub fn new(field: impl Into<String>, label: impl Into<String>, kind: FilterType) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            kind,
            options: Vec::new(),
            is_relationship: false,
        }
    }

    pub fn options(mut self, options: impl IntoIterator<Item = SelectOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    pub fn through_relationship(mut self) -> Self {
        self.is_relationship = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    pub entity_name: String,
    pub plural_name: String,
    pub permission_prefix: String,
    pub searchable: Vec<String>,
    pub default_sort: String,
    pub default_direction: SortDirection,
    pub columns: Vec<Column>,
    pub fields: Vec<Field>,
    pub filters: Vec<Filter>,
    pub eager_load: Vec<String>,
    /// Filled from the admin configuration when the registry is built.
    pub locales: Vec<Locale>,
}

impl EntityDescriptor {
    pub fn new(
        entity_name: impl Into<String>,
        plural_name: impl Into<String>,
        permission_prefix: impl Into<String>,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            plural_name: plural_name.into(),
            permission_prefix: permission_prefix.into(),
            searchable: Vec::new(),
            default_sort: "id".into(),
            default_direction: SortDirection::Asc,
            columns: Vec::new(),
            fields: Vec::new(),
            filters: Vec::new(),
            eager_load: Vec::new(),
            locales: Vec::new(),
        }
    }

    pub fn searchable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.default_sort = field.into();
        self.default_direction = direction;
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eager_load(mut self, relation: impl Into<String>) -> Self {
        self.eager_load.push(relation.into());
        self
    }

    pub fn permission(&self, ability: Ability) -> String {
        format!("{}.{}", self.permission_prefix, ability.as_str())
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column_named(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn filter_named(&self, field: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.field == field)
    }

    /// File fields, each owning one attachment collection.
    pub fn attachable_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.kind.is_file())
    }

    pub fn locale_codes(&self) -> impl Iterator<Item = &str> {
        self.locales.iter().map(|l| l.code.as_str())
    }

    pub fn has_locale(&self, code: &str) -> bool {
        self.locales.iter().any(|l| l.code == code)
    }

    pub fn fallback_locale(&self) -> &str {
        self.locales.first().map(|l| l.code.as_str()).unwrap_or("en")
    }
}
