// registry.rs — Block definition registry
//
// Read-only table of block definitions, loaded from JSON documents and
// injected into the validator and the compile pipeline. A definition lists
// the block's declared slots (with optional default sources) and the
// subcategory the structural rules key on.
//
// Patch documents may list only a block's id and type; `resolve_patch`
// fills in the slots, defaults and params from the definition. A block
// whose type is missing from the registry is never fatal: it is left as
// declared and the validator reports `W_UNKNOWN_BLOCK_TYPE`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};
use crate::id::BlockId;
use crate::patch::{Block, Literal, Patch, Slot};

// ── Data types ──────────────────────────────────────────────────────────────

/// Structural role of a block type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subcategory {
    /// Drives patch time; exactly one per patch.
    TimeRoot,
    /// Hidden provider backing an unconnected input.
    DefaultSource,
    Domain,
    Signal,
    Field,
    Render,
    Program,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub subcategory: Subcategory,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Literal>,
    #[serde(default)]
    pub inputs: Vec<Slot>,
    #[serde(default)]
    pub outputs: Vec<Slot>,
}

impl BlockDefinition {
    pub fn new(block_type: impl Into<String>, subcategory: Subcategory) -> Self {
        BlockDefinition {
            block_type: block_type.into(),
            subcategory,
            params: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, slot: Slot) -> Self {
        self.inputs.push(slot);
        self
    }

    pub fn with_output(mut self, slot: Slot) -> Self {
        self.outputs.push(slot);
        self
    }

    /// Create a block instance carrying this definition's slots and params.
    pub fn instantiate(&self, id: impl Into<BlockId>) -> Block {
        let mut block = Block::new(id, self.block_type.clone());
        block.params = self.params.clone();
        block.inputs = self.inputs.clone();
        block.outputs = self.outputs.clone();
        if self.subcategory == Subcategory::DefaultSource {
            block.hidden = true;
            block.role = crate::patch::BlockRole::DefaultProvider;
        }
        block
    }

    /// True when `block` already declares every slot and param of this
    /// definition.
    fn is_covered_by(&self, block: &Block) -> bool {
        self.inputs.iter().all(|s| block.input(&s.id).is_some())
            && self.outputs.iter().all(|s| block.output(&s.id).is_some())
            && self.params.keys().all(|k| block.params.contains_key(k))
    }

    /// `block` with this definition's slots and params filled in. Slots and
    /// params the block declares itself take precedence; definition slots
    /// come first in definition order, block-only slots follow.
    pub fn resolve(&self, block: &Block) -> Block {
        let mut resolved = block.clone();
        resolved.inputs = merge_slots(&self.inputs, &block.inputs);
        resolved.outputs = merge_slots(&self.outputs, &block.outputs);
        for (name, value) in &self.params {
            resolved
                .params
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        resolved
    }
}

fn merge_slots(declared: &[Slot], own: &[Slot]) -> Vec<Slot> {
    let mut merged: Vec<Slot> = declared
        .iter()
        .map(|d| own.iter().find(|s| s.id == d.id).unwrap_or(d).clone())
        .collect();
    merged.extend(
        own.iter()
            .filter(|s| declared.iter().all(|d| d.id != s.id))
            .cloned(),
    );
    merged
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    blocks: Vec<BlockDefinition>,
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Block definitions keyed by type name, with the origin each came from.
#[derive(Debug, Clone)]
pub struct Registry {
    blocks: BTreeMap<String, (BlockDefinition, String)>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            blocks: BTreeMap::new(),
        }
    }

    /// A registry pre-populated with the built-in default-source providers.
    pub fn with_default_providers() -> Self {
        let mut registry = Registry::new();
        for kind in crate::materialize::ProviderKind::ALL {
            registry
                .blocks
                .insert(kind.block_type().to_string(), (kind.definition(), "<builtin>".into()));
        }
        registry
    }

    /// Add one definition. `origin` names where it came from for duplicate
    /// reports.
    pub fn register(&mut self, definition: BlockDefinition, origin: &str) -> PatchResult<()> {
        if let Some((_, first)) = self.blocks.get(&definition.block_type) {
            return Err(PatchError::DuplicateBlockType {
                block_type: definition.block_type.clone(),
                first: first.clone(),
                second: origin.to_string(),
            });
        }
        self.blocks.insert(
            definition.block_type.clone(),
            (definition, origin.to_string()),
        );
        Ok(())
    }

    /// Load definitions from a JSON string. Returns the number added.
    pub fn load_str(&mut self, source: &str, origin: &str) -> PatchResult<usize> {
        let doc: RegistryDocument = serde_json::from_str(source)
            .map_err(|e| PatchError::json(format!("registry {origin}"), e))?;
        let count = doc.blocks.len();
        for definition in doc.blocks {
            self.register(definition, origin)?;
        }
        Ok(count)
    }

    /// Load definitions from a JSON file. Returns the number added.
    pub fn load_json(&mut self, path: &Path) -> PatchResult<usize> {
        let source = std::fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
        self.load_str(&source, &path.display().to_string())
    }

    pub fn get_block_definition(&self, block_type: &str) -> Option<&BlockDefinition> {
        self.blocks.get(block_type).map(|(def, _)| def)
    }

    /// `patch` with every registered block resolved through its definition.
    /// Borrows the input when every block already declares its full
    /// definition; unknown types are left untouched.
    pub fn resolve_patch<'p>(&self, patch: &'p Patch) -> Cow<'p, Patch> {
        let mut resolved: Option<Patch> = None;
        for (i, block) in patch.blocks.iter().enumerate() {
            let Some(definition) = self.get_block_definition(&block.block_type) else {
                continue;
            };
            if definition.is_covered_by(block) {
                continue;
            }
            let out = resolved.get_or_insert_with(|| patch.clone());
            out.blocks[i] = definition.resolve(block);
        }
        match resolved {
            Some(patch) => Cow::Owned(patch),
            None => Cow::Borrowed(patch),
        }
    }

    pub fn subcategory(&self, block_type: &str) -> Option<Subcategory> {
        self.get_block_definition(block_type).map(|d| d.subcategory)
    }

    /// Definitions in ascending type-name order.
    pub fn definitions(&self) -> impl Iterator<Item = &BlockDefinition> {
        self.blocks.values().map(|(def, _)| def)
    }

    /// Deterministic JSON of all definitions (sorted by type name).
    pub fn canonical_json(&self) -> PatchResult<String> {
        let defs: Vec<&BlockDefinition> = self.definitions().collect();
        serde_json::to_string(&defs).map_err(|e| PatchError::json("registry canonical form", e))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
