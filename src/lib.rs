//! Client-side resource cache and request coalescing for hypermedia JSON APIs.
//!
//! A [`Client`] serves resources by URL from a bounded LRU cache, joins
//! concurrent fetches of the same URL onto a single transport call, and keeps
//! every interested listener informed when a resource changes, whether through
//! a later fetch or through the invalidations derived from a mutation.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use hyperjson_client::Client;
//!
//! let client = Client::builder("https://api.example.com/").build()?;
//! let subscription = client.get("/items/5", |outcome| match outcome {
//!     Ok(resource) => println!("{}", resource.body.value()),
//!     Err(err) => eprintln!("{err}"),
//! });
//! // ... later
//! subscription.unsubscribe();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod links;
pub mod telemetry;
pub mod transport;

pub use cache::{Outcome, Resource, Seed};
pub use client::{Client, ClientBuilder, Submission, Subscription};
pub use document::{BodyCodec, Document, JsonCodec};
pub use error::{BuildError, ClientError};
pub use links::{LinkMap, LinkTarget, parse_link_header};
pub use transport::{Transport, TransportError, TransportRequest, TransportResponse};
