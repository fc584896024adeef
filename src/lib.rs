// Library root for the economy migration tool.
//
// **Architecture Overview:**
// - `core/` = Economy abstractions and the migration engine (storage-agnostic)
// - `infra/` = Provider implementations (in-memory, SQLite)
// - `cli/` = The thin command layer (config, provider registry, rendering)

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "cli/cli_layer.rs"]
pub mod cli;
#[path = "infra/infra_layer.rs"]
pub mod infra;
