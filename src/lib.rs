/// SWOT input preparation service.
///
/// Pulls SWOT river (reach + node) and lake observations, aligns node
/// observations onto the reach's observation instants, derives the change in
/// cross-sectional area where upstream left it empty, and writes one dense,
/// self-describing dataset per feature. A separate path merges USGS gage
/// statistics into the per-continent reference store.
///
/// Module layout:
///
/// ```text
/// swot_input
/// ├── model      identifiers, observation records, InputError
/// ├── fill       fill sentinels and value coercion
/// ├── fields     reach / node / lake field vocabularies
/// ├── align      reach series + nearest-timestamp node alignment
/// ├── area       d_x_area derivation and node broadcast
/// ├── dense      dense (T,) and (N, T) field arrays
/// ├── pipeline   per-feature assembly: source -> align -> derive -> build
/// ├── output     dataset writer / reader
/// ├── ingest     record sources (hydrocron, local, replay) + retry
/// ├── gage       USGS NWIS pull, gage statistics, reference merge
/// ├── jobs       job list + batch index selection
/// ├── config     TOML configuration
/// └── logging    tracing setup and failure classification
/// ```
pub mod align;
pub mod area;
pub mod config;
pub mod dense;
pub mod fields;
pub mod fill;
pub mod gage;
pub mod ingest;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod output;
pub mod pipeline;
