// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # actiongraph
//!
//! Entity identification, bookkeeping and semantic motif recognition for
//! biochemical action graphs: typed graphs of proteins, their regions, sites
//! and residues, and the modification and binding actions between them.
//!
//! ## Architecture
//!
//! - **Typed graph store** (`store`): generation-checked handles over a
//!   `petgraph` arena, pattern matching and rule-based rewriting
//! - **Entity identification** (`identify`): read-only queries deciding
//!   whether a component mentioned by a nugget already exists
//! - **Bookkeeping** (`bookkeeping`): idempotent repair of containment and
//!   transitive edges after each insertion
//! - **Semantics** (`semantics`): kinase phosphorylation and SH2–pY binding
//!   recognition, autocompletion and action merging
//! - **Corpus** (`corpus`): the orchestration layer driving all of the above
//!
//! ## Library usage
//!
//! ```no_run
//! use actiongraph::config::CorpusConfig;
//! use actiongraph::corpus::{Corpus, ProtoformEntry};
//! use actiongraph::diagnostics::Diagnostics;
//! use actiongraph::nugget::{ActorDesc, Interaction, ModInteraction, RegionDesc, ResidueDesc, StateDesc, TargetDesc};
//!
//! let mut corpus = Corpus::new(CorpusConfig::default());
//! let egfr = ProtoformEntry::new("P00533")
//!     .with_region(RegionDesc::named("Protein kinase").at(712, 979).with_interpro("IPR000719"));
//! corpus.add_protoform(&egfr, &mut Diagnostics::new()).unwrap();
//!
//! let report = corpus
//!     .add_interaction(&Interaction::Mod(ModInteraction {
//!         enzyme: ActorDesc::protoform("P00533"),
//!         substrate: ActorDesc::protoform("P00533"),
//!         target: TargetDesc {
//!             residue: Some(ResidueDesc::new('Y', 1092)),
//!             state: StateDesc::new("phosphorylation", false),
//!         },
//!         value: true,
//!         desc: None,
//!     }))
//!     .unwrap();
//! println!("{:?}", report.outcome);
//! ```

pub mod attrs;
pub mod bookkeeping;
pub mod config;
pub mod corpus;
pub mod diagnostics;
pub mod error;
pub mod identify;
pub mod nugget;
pub mod semantics;
pub mod store;
