//! # lesson-forge – paginated PDF export of medical lessons
//!
//! A lesson is laid out once as a single tall surface, then exported in
//! these stages:
//!
//! 1. **Settle** – load illustrations, bounded by a timeout ([`settle`])
//! 2. **Layout** – lay out title and sections with Taffy ([`layout`])
//! 3. **Measure** – one height per top-level block ([`measure`])
//! 4. **Plan** – push blocks that would straddle a page boundary ([`planner`])
//! 5. **Rasterize** – paint the surface into one bitmap ([`raster`])
//! 6. **Slice** – place the bitmap onto A4 pages and write the PDF ([`slicer`])
//! 7. **Deliver** – share the file or save it locally ([`delivery`])
//!
//! [`pipeline::Exporter`] runs all of them.

pub mod config;
pub mod delivery;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod lesson;
pub mod measure;
pub mod pipeline;
pub mod planner;
pub mod raster;
pub mod samples;
pub mod settle;
pub mod slicer;

pub use config::{ExportConfig, ExportQuality};
pub use error::{Error, Result};
pub use lesson::{LessonDocument, SectionKind};
pub use pipeline::{generate_pdf, Exporter, ExportReport};
pub use planner::{plan_page_breaks, PaginationPlanner};
