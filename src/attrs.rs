//! Attribute model: meta-types, multi-valued attribute bags and typed node data.
//!
//! Attributes of nodes and edges are *sets* of possible values. Merging two
//! nodes unions their sets, so a merged residue may read `{S, T}` as its amino
//! acids. Readers that need a single value take the smallest element as the
//! representative.
//!
//! Each meta-type carries a strongly typed attribute struct inside
//! [`NodeData`]; the dynamic [`Attrs`] bag is only the store-contract view and
//! the home of open-ended keys (synonyms, cross-references) in `extra`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{GraphError, GraphResult};

/// Well-known attribute keys of the dynamic view.
pub mod keys {
    pub const UNIPROT_ID: &str = "uniprotid";
    pub const NAME: &str = "name";
    pub const INTERPRO_ID: &str = "interproid";
    pub const ORDER: &str = "order";
    pub const AA: &str = "aa";
    pub const TEST: &str = "test";
    pub const VALUE: &str = "value";
    pub const START: &str = "start";
    pub const END: &str = "end";
    pub const LOC: &str = "loc";
    pub const TYPE: &str = "type";
}

/// Edge `type` value marking a derived shortcut edge.
pub const TRANSITIVE: &str = "transitive";

// ---------------------------------------------------------------------------
// Meta-types
// ---------------------------------------------------------------------------

/// The closed set of node meta-types of an action graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaType {
    Protoform,
    Region,
    Site,
    Residue,
    State,
    Mod,
    Bnd,
}

impl MetaType {
    pub const ALL: [MetaType; 7] = [
        MetaType::Protoform,
        MetaType::Region,
        MetaType::Site,
        MetaType::Residue,
        MetaType::State,
        MetaType::Mod,
        MetaType::Bnd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protoform => "protoform",
            Self::Region => "region",
            Self::Site => "site",
            Self::Residue => "residue",
            Self::State => "state",
            Self::Mod => "mod",
            Self::Bnd => "bnd",
        }
    }

    /// Action nodes (`mod`, `bnd`) bound structural traversals.
    pub fn is_action(self) -> bool {
        matches!(self, Self::Mod | Self::Bnd)
    }

    pub fn is_structural(self) -> bool {
        !self.is_action()
    }

    /// Regions and sites: positional sub-ranges of an owner.
    pub fn is_fragment(self) -> bool {
        matches!(self, Self::Region | Self::Site)
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown meta-type '{0}'")]
pub struct ParseMetaTypeError(pub String);

impl FromStr for MetaType {
    type Err = ParseMetaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetaType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseMetaTypeError(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Dynamic values
// ---------------------------------------------------------------------------

/// A single dynamic attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<char> for AttrValue {
    fn from(c: char) -> Self {
        Self::Str(c.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A set of possible values for one attribute.
pub type AttrSet = BTreeSet<AttrValue>;

/// Multi-valued attribute bag keyed by attribute name.
pub type Attrs = BTreeMap<String, AttrSet>;

/// Build an attribute bag from `(key, values)` pairs.
pub fn attrs_from<I, V>(pairs: I) -> Attrs
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: IntoIterator<Item = AttrValue>,
{
    let mut out = Attrs::new();
    for (key, values) in pairs {
        out.entry(key.to_string()).or_default().extend(values);
    }
    out
}

/// Union `other` into `target`, key by key.
pub fn union_attrs(target: &mut Attrs, other: &Attrs) {
    for (key, values) in other {
        target
            .entry(key.clone())
            .or_default()
            .extend(values.iter().cloned());
    }
}

fn put<T, I>(attrs: &mut Attrs, key: &str, values: I)
where
    T: Into<AttrValue>,
    I: IntoIterator<Item = T>,
{
    let set: AttrSet = values.into_iter().map(Into::into).collect();
    if !set.is_empty() {
        attrs.insert(key.to_string(), set);
    }
}

fn strings(values: &AttrSet) -> impl Iterator<Item = String> + '_ {
    values.iter().filter_map(|v| v.as_str().map(str::to_string))
}

fn ints(values: &AttrSet) -> impl Iterator<Item = i64> + '_ {
    values.iter().filter_map(AttrValue::as_int)
}

fn bools(values: &AttrSet) -> impl Iterator<Item = bool> + '_ {
    values.iter().filter_map(AttrValue::as_bool)
}

fn keep_extra(extra: &mut Attrs, key: &str, values: &AttrSet) {
    extra
        .entry(key.to_string())
        .or_default()
        .extend(values.iter().cloned());
}

// ---------------------------------------------------------------------------
// Typed attribute structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtoformAttrs {
    pub uniprot_id: BTreeSet<String>,
    pub names: BTreeSet<String>,
    pub extra: Attrs,
}

impl ProtoformAttrs {
    pub fn new(uniprot_id: impl Into<String>) -> Self {
        Self {
            uniprot_id: BTreeSet::from([uniprot_id.into()]),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }
}

/// Attributes shared by regions and sites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentAttrs {
    pub names: BTreeSet<String>,
    pub interpro_ids: BTreeSet<String>,
    pub order: BTreeSet<i64>,
    pub extra: Attrs,
}

impl FragmentAttrs {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            names: BTreeSet::from([name.into()]),
            ..Default::default()
        }
    }

    pub fn with_interpro(mut self, id: impl Into<String>) -> Self {
        self.interpro_ids.insert(id.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order.insert(order);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResidueAttrs {
    pub aa: BTreeSet<char>,
    pub test: BTreeSet<bool>,
    pub extra: Attrs,
}

impl ResidueAttrs {
    pub fn new(aa: char) -> Self {
        Self {
            aa: BTreeSet::from([aa.to_ascii_uppercase()]),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateAttrs {
    pub name: BTreeSet<String>,
    pub test: BTreeSet<bool>,
    pub extra: Attrs,
}

impl StateAttrs {
    pub fn new(name: impl Into<String>, test: bool) -> Self {
        Self {
            name: BTreeSet::from([name.into()]),
            test: BTreeSet::from([test]),
            extra: Attrs::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModAttrs {
    pub value: BTreeSet<bool>,
    pub extra: Attrs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BndAttrs {
    pub test: BTreeSet<bool>,
    pub extra: Attrs,
}

// ---------------------------------------------------------------------------
// Node data
// ---------------------------------------------------------------------------

/// The payload of a node: its meta-type together with its typed attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Protoform(ProtoformAttrs),
    Region(FragmentAttrs),
    Site(FragmentAttrs),
    Residue(ResidueAttrs),
    State(StateAttrs),
    Mod(ModAttrs),
    Bnd(BndAttrs),
}

impl NodeData {
    pub fn protoform(uniprot_id: impl Into<String>) -> Self {
        Self::Protoform(ProtoformAttrs::new(uniprot_id))
    }

    pub fn region(name: impl Into<String>) -> Self {
        Self::Region(FragmentAttrs::named(name))
    }

    pub fn site(name: impl Into<String>) -> Self {
        Self::Site(FragmentAttrs::named(name))
    }

    pub fn residue(aa: char) -> Self {
        Self::Residue(ResidueAttrs::new(aa))
    }

    pub fn state(name: impl Into<String>, test: bool) -> Self {
        Self::State(StateAttrs::new(name, test))
    }

    pub fn modification(value: bool) -> Self {
        Self::Mod(ModAttrs {
            value: BTreeSet::from([value]),
            extra: Attrs::new(),
        })
    }

    pub fn binding() -> Self {
        Self::Bnd(BndAttrs {
            test: BTreeSet::from([true]),
            extra: Attrs::new(),
        })
    }

    /// An attribute-less node of the given meta-type.
    pub fn empty(meta_type: MetaType) -> Self {
        match meta_type {
            MetaType::Protoform => Self::Protoform(ProtoformAttrs::default()),
            MetaType::Region => Self::Region(FragmentAttrs::default()),
            MetaType::Site => Self::Site(FragmentAttrs::default()),
            MetaType::Residue => Self::Residue(ResidueAttrs::default()),
            MetaType::State => Self::State(StateAttrs::default()),
            MetaType::Mod => Self::Mod(ModAttrs::default()),
            MetaType::Bnd => Self::Bnd(BndAttrs::default()),
        }
    }

    pub fn meta_type(&self) -> MetaType {
        match self {
            Self::Protoform(_) => MetaType::Protoform,
            Self::Region(_) => MetaType::Region,
            Self::Site(_) => MetaType::Site,
            Self::Residue(_) => MetaType::Residue,
            Self::State(_) => MetaType::State,
            Self::Mod(_) => MetaType::Mod,
            Self::Bnd(_) => MetaType::Bnd,
        }
    }

    /// Representative uniprot accession of a protoform.
    pub fn uniprot_id(&self) -> Option<&str> {
        match self {
            Self::Protoform(p) => p.uniprot_id.first().map(String::as_str),
            _ => None,
        }
    }

    /// Representative name of a protoform, fragment or state.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Protoform(p) => p.names.first(),
            Self::Region(f) | Self::Site(f) => f.names.first(),
            Self::State(s) => s.name.first(),
            _ => None,
        }
        .map(String::as_str)
    }

    pub fn fragment(&self) -> Option<&FragmentAttrs> {
        match self {
            Self::Region(f) | Self::Site(f) => Some(f),
            _ => None,
        }
    }

    pub fn amino_acids(&self) -> Option<&BTreeSet<char>> {
        match self {
            Self::Residue(r) => Some(&r.aa),
            _ => None,
        }
    }

    /// The `test` set of a residue, state or binding.
    pub fn test(&self) -> Option<&BTreeSet<bool>> {
        match self {
            Self::Residue(r) => Some(&r.test),
            Self::State(s) => Some(&s.test),
            Self::Bnd(b) => Some(&b.test),
            _ => None,
        }
    }

    /// The `value` set of a modification.
    pub fn mod_value(&self) -> Option<&BTreeSet<bool>> {
        match self {
            Self::Mod(m) => Some(&m.value),
            _ => None,
        }
    }

    /// Dynamic view of the attributes.
    pub fn attrs(&self) -> Attrs {
        let mut out = Attrs::new();
        let extra = match self {
            Self::Protoform(p) => {
                put(&mut out, keys::UNIPROT_ID, p.uniprot_id.iter().cloned());
                put(&mut out, keys::NAME, p.names.iter().cloned());
                &p.extra
            }
            Self::Region(f) | Self::Site(f) => {
                put(&mut out, keys::NAME, f.names.iter().cloned());
                put(&mut out, keys::INTERPRO_ID, f.interpro_ids.iter().cloned());
                put(&mut out, keys::ORDER, f.order.iter().copied());
                &f.extra
            }
            Self::Residue(r) => {
                put(&mut out, keys::AA, r.aa.iter().copied());
                put(&mut out, keys::TEST, r.test.iter().copied());
                &r.extra
            }
            Self::State(s) => {
                put(&mut out, keys::NAME, s.name.iter().cloned());
                put(&mut out, keys::TEST, s.test.iter().copied());
                &s.extra
            }
            Self::Mod(m) => {
                put(&mut out, keys::VALUE, m.value.iter().copied());
                &m.extra
            }
            Self::Bnd(b) => {
                put(&mut out, keys::TEST, b.test.iter().copied());
                &b.extra
            }
        };
        union_attrs(&mut out, extra);
        out
    }

    /// Add dynamic attributes; known keys land in typed fields.
    pub fn add_attrs(&mut self, attrs: &Attrs) {
        for (key, values) in attrs {
            let key = key.as_str();
            match self {
                Self::Protoform(p) => match key {
                    keys::UNIPROT_ID => p.uniprot_id.extend(strings(values)),
                    keys::NAME => p.names.extend(strings(values)),
                    _ => keep_extra(&mut p.extra, key, values),
                },
                Self::Region(f) | Self::Site(f) => match key {
                    keys::NAME => f.names.extend(strings(values)),
                    keys::INTERPRO_ID => f.interpro_ids.extend(strings(values)),
                    keys::ORDER => f.order.extend(ints(values)),
                    _ => keep_extra(&mut f.extra, key, values),
                },
                Self::Residue(r) => match key {
                    keys::AA => r.aa.extend(
                        strings(values)
                            .flat_map(|s| s.chars().collect::<Vec<_>>())
                            .map(|c| c.to_ascii_uppercase()),
                    ),
                    keys::TEST => r.test.extend(bools(values)),
                    _ => keep_extra(&mut r.extra, key, values),
                },
                Self::State(s) => match key {
                    keys::NAME => s.name.extend(strings(values)),
                    keys::TEST => s.test.extend(bools(values)),
                    _ => keep_extra(&mut s.extra, key, values),
                },
                Self::Mod(m) => match key {
                    keys::VALUE => m.value.extend(bools(values)),
                    _ => keep_extra(&mut m.extra, key, values),
                },
                Self::Bnd(b) => match key {
                    keys::TEST => b.test.extend(bools(values)),
                    _ => keep_extra(&mut b.extra, key, values),
                },
            }
        }
    }

    /// Union the attributes of `other` into `self`.
    pub fn merge_from(&mut self, other: &NodeData) -> GraphResult<()> {
        if self.meta_type() != other.meta_type() {
            return Err(GraphError::MetaTypeMismatch {
                expected: self.meta_type(),
                actual: other.meta_type(),
            });
        }
        self.add_attrs(&other.attrs());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Edge attributes
// ---------------------------------------------------------------------------

/// Attributes carried by an edge. Positions of fragments and residues live
/// here, relative to the owner the edge points to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeAttrs {
    pub start: BTreeSet<i64>,
    pub end: BTreeSet<i64>,
    pub loc: BTreeSet<i64>,
    pub kind: BTreeSet<String>,
    pub extra: Attrs,
}

impl EdgeAttrs {
    pub fn range(start: i64, end: i64) -> Self {
        Self {
            start: BTreeSet::from([start]),
            end: BTreeSet::from([end]),
            ..Default::default()
        }
    }

    pub fn at(loc: i64) -> Self {
        Self {
            loc: BTreeSet::from([loc]),
            ..Default::default()
        }
    }

    pub fn transitive() -> Self {
        Self::default().into_transitive()
    }

    /// Mark this edge as a derived shortcut.
    pub fn into_transitive(mut self) -> Self {
        self.kind.insert(TRANSITIVE.to_string());
        self
    }

    /// Representative `[start, end]` range.
    pub fn range_bounds(&self) -> Option<(i64, i64)> {
        Some((*self.start.first()?, *self.end.first()?))
    }

    pub fn start(&self) -> Option<i64> {
        self.start.first().copied()
    }

    /// Representative location.
    pub fn loc(&self) -> Option<i64> {
        self.loc.first().copied()
    }

    pub fn is_transitive(&self) -> bool {
        self.kind.contains(TRANSITIVE)
    }

    /// Positional payload only, without the edge kind.
    pub fn positional(&self) -> Self {
        Self {
            start: self.start.clone(),
            end: self.end.clone(),
            loc: self.loc.clone(),
            ..Default::default()
        }
    }

    pub fn union_with(&mut self, other: &EdgeAttrs) {
        self.start.extend(other.start.iter().copied());
        self.end.extend(other.end.iter().copied());
        self.loc.extend(other.loc.iter().copied());
        self.kind.extend(other.kind.iter().cloned());
        union_attrs(&mut self.extra, &other.extra);
    }

    /// Dynamic view of the attributes.
    pub fn attrs(&self) -> Attrs {
        let mut out = Attrs::new();
        put(&mut out, keys::START, self.start.iter().copied());
        put(&mut out, keys::END, self.end.iter().copied());
        put(&mut out, keys::LOC, self.loc.iter().copied());
        put(&mut out, keys::TYPE, self.kind.iter().cloned());
        union_attrs(&mut out, &self.extra);
        out
    }

    /// Build typed edge attributes from a dynamic bag.
    pub fn from_attrs(attrs: &Attrs) -> Self {
        let mut out = Self::default();
        for (key, values) in attrs {
            match key.as_str() {
                keys::START => out.start.extend(ints(values)),
                keys::END => out.end.extend(ints(values)),
                keys::LOC => out.loc.extend(ints(values)),
                keys::TYPE => out.kind.extend(strings(values)),
                _ => keep_extra(&mut out.extra, key, values),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_type_round_trips_through_str() {
        for t in MetaType::ALL {
            assert_eq!(t.as_str().parse::<MetaType>().unwrap(), t);
        }
        assert_eq!("BND".parse::<MetaType>().unwrap(), MetaType::Bnd);
        assert!("gene".parse::<MetaType>().is_err());
    }

    #[test]
    fn action_types_are_not_structural() {
        assert!(MetaType::Mod.is_action());
        assert!(MetaType::Bnd.is_action());
        assert!(MetaType::State.is_structural());
        assert!(MetaType::Site.is_fragment());
        assert!(!MetaType::Residue.is_fragment());
    }

    #[test]
    fn merging_residues_superposes_amino_acids() {
        let mut a = NodeData::residue('S');
        let b = NodeData::residue('t');
        a.merge_from(&b).unwrap();
        let aa = a.amino_acids().unwrap();
        assert_eq!(aa.iter().copied().collect::<Vec<_>>(), vec!['S', 'T']);
    }

    #[test]
    fn merging_different_meta_types_fails() {
        let mut a = NodeData::residue('S');
        let b = NodeData::state("activity", true);
        let err = a.merge_from(&b).unwrap_err();
        assert!(matches!(err, GraphError::MetaTypeMismatch { .. }));
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let mut node = NodeData::protoform("P00533");
        node.add_attrs(&attrs_from([
            ("hgnc_symbol", vec![AttrValue::from("EGFR")]),
            (keys::NAME, vec![AttrValue::from("Epidermal growth factor receptor")]),
        ]));
        let NodeData::Protoform(p) = &node else {
            panic!("expected protoform");
        };
        assert!(p.extra.contains_key("hgnc_symbol"));
        assert_eq!(node.name(), Some("Epidermal growth factor receptor"));
        assert_eq!(node.attrs()[keys::UNIPROT_ID].len(), 1);
    }

    #[test]
    fn edge_attrs_dynamic_view_round_trips() {
        let edge = EdgeAttrs::range(10, 50).into_transitive();
        let back = EdgeAttrs::from_attrs(&edge.attrs());
        assert_eq!(back, edge);
        assert!(back.is_transitive());
        assert_eq!(back.range_bounds(), Some((10, 50)));
    }

    #[test]
    fn representative_is_smallest_value() {
        let mut edge = EdgeAttrs::at(30);
        edge.union_with(&EdgeAttrs::at(12));
        assert_eq!(edge.loc(), Some(12));
        assert_eq!(edge.range_bounds(), None);
    }
}
