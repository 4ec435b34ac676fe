//! Terratile - tiled multi-resolution raster cache with asynchronous,
//! deduplicated retrieval
//!
//! This library provides the data backbone of a geospatial tile-rendering
//! engine: it answers point, grid, and extrema queries over a raster pyramid
//! (elevation or imagery samples) backed by a remote service, without ever
//! blocking the calling (render) thread. Queries return the best currently
//! available data immediately and schedule background fetches for missing
//! pieces; the caller re-queries on a later frame to pick up finer data.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TiledBlockSampler                        │
//! │   query_point / query_grid / query_extrema                  │
//! │   (level descent, tile block assembly, bilinear sampling)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ResourceCacheAdapter                       │
//! │   pending-queue drain (single-writer) + hit-or-fetch        │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                           │
//!                  ▼                           ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │      LruCache<K, V>      │   │       Retriever<K, V>        │
//! │  size-bounded, low-water │   │  in-flight dedup set, task   │
//! │  eviction sweep          │   │  pool, elastic worker threads│
//! └──────────────────────────┘   └──────────────────────────────┘
//!                                              │
//!                                              ▼
//!                                ┌──────────────────────────────┐
//!                                │ TileAddressResolver + Decoder│
//!                                │ (injected, e.g. WMS + codec) │
//!                                └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use terratile::config::SamplerConfig;
//! use terratile::geom::Sector;
//! use terratile::ogc::{WmsAddressResolver, WmsLayerConfig};
//! use terratile::pyramid::TilePyramid;
//! use terratile::sampler::TiledBlockSampler;
//!
//! let pyramid = TilePyramid::new(Sector::full_sphere(), 90.0, 256, 256, 13)?;
//! let resolver = Arc::new(WmsAddressResolver::new(
//!     WmsLayerConfig::new("https://example.com/wms", "elevation"),
//! ));
//! let mut sampler = TiledBlockSampler::new(
//!     pyramid, resolver, decoder, SamplerConfig::default(),
//! )?;
//!
//! // Non-blocking: returns the best available data, fetching in background.
//! let grid = sampler.query_grid(&region, 32, 32)?;
//! ```

pub mod cache;
pub mod config;
pub mod geom;
pub mod ogc;
pub mod pyramid;
pub mod resource;
pub mod retriever;
pub mod sampler;

/// Version of the terratile library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
