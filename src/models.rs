//! Data models for recipes, requests and raw source entries

use std::collections::BTreeMap;

/// Requested top-tier quantities, keyed by item identity
pub type RequestVector = BTreeMap<String, f64>;

/// Canonical recipe shape shared by every tier
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeRecord {
    pub build_time: f64,     // Seconds per production cycle
    pub yield_quantity: f64, // Output units per production cycle
    pub ingredients: BTreeMap<String, f64>,
}

impl Default for RecipeRecord {
    fn default() -> Self {
        Self {
            build_time: 0.0,
            yield_quantity: 1.0,
            ingredients: BTreeMap::new(),
        }
    }
}

impl RecipeRecord {
    pub fn new(build_time: f64, yield_quantity: f64) -> Self {
        Self {
            build_time,
            yield_quantity,
            ingredients: BTreeMap::new(),
        }
    }

    /// Add an ingredient; repeated references to the same child accumulate
    #[cfg(test)]
    pub fn with_ingredient(mut self, id: impl Into<String>, amount: f64) -> Self {
        self.add_ingredient(id, amount);
        self
    }

    pub fn add_ingredient(&mut self, id: impl Into<String>, amount: f64) {
        *self.ingredients.entry(id.into()).or_default() += amount;
    }
}

/// Logical partition of the cost database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Blocks,     // Assembled units
    Components, // Assembler products
    Materials,  // Refinery products (ingots)
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Blocks => "blocks",
            Partition::Components => "components",
            Partition::Materials => "materials",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blocks" => Some(Partition::Blocks),
            "components" => Some(Partition::Components),
            "materials" => Some(Partition::Materials),
            _ => None,
        }
    }
}

/// A `TypeId`/`SubtypeId`/`Amount` reference as it appears in blueprint files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemRef {
    pub type_id: Option<String>,
    pub subtype_id: Option<String>,
    pub amount: Option<String>,
}

/// `<Component Subtype=".." Count=".."/>` child of a block definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentRef {
    pub subtype: Option<String>,
    pub count: Option<String>,
}

/// Cube block definition as read from `CubeBlocks/*.sbc`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockDefinition {
    pub type_id: Option<String>,
    pub subtype_id: Option<String>,
    pub cube_size: Option<String>,
    pub build_time: Option<String>,
    pub components: Vec<ComponentRef>,
}

/// Assembler or refinery blueprint as read from `Blueprints.sbc`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlueprintDefinition {
    pub subtype_id: Option<String>,
    pub results: Vec<ItemRef>,
    pub prerequisites: Vec<ItemRef>,
    pub production_time: Option<String>,
}

/// One raw recipe entry, tagged by the source schema it came from
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    AssembledUnit(BlockDefinition),
    Component(BlueprintDefinition),
    Refined(BlueprintDefinition),
}

/// A block placed on a ship grid (`MyObjectBuilder_CubeBlock`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridBlock {
    pub xsi_type: Option<String>,
    pub subtype_name: Option<String>,
    pub entity_id: Option<String>,
}
