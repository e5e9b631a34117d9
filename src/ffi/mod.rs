//! C ABI for embedding the engine.
//!
//! The header is `include/local_disc/api.h`.
//!
//! # Quick start (C)
//!
//! ```c
//! #include "local_disc/api.h"
//!
//! static void on_progress(int pct, const char *msg) {
//!     printf("[%3d%%] %s\n", pct, msg);
//! }
//!
//! if (initialize_engine("sqlite:///tmp/shop.db") != 0) {
//!     fprintf(stderr, "%s\n", get_last_error());
//!     return 1;
//! }
//! start_import("shopify", "/tmp/orders.csv", on_progress);
//!
//! char *json = execute_query("SELECT count(*) FROM orders");
//! puts(json);
//! free_query_result(json);
//! ```
//!
//! # Error handling
//!
//! Status-returning functions return `0` or a negative [`ErrorCode`];
//! pointer-returning functions return null. Either way
//! [`get_last_error`](api::get_last_error) and
//! [`get_last_error_code`](api::get_last_error_code) describe the failure.
//!
//! # Memory management
//!
//! * Strings from `execute_query` / `local_disc_execute` belong to the caller
//!   and go back through `free_query_result`.
//! * The version string and last-error string are owned by the library.
//! * Handles from `local_disc_open` are freed with `local_disc_close`.
//!
//! # Thread safety
//!
//! Every function may be called from any thread. Calls on one engine are
//! serialized; an import blocks queries on the same engine until it ends.
//! A progress callback may cancel its import, but any other call it makes
//! into that engine fails with [`ErrorCode::Busy`] instead of waiting on
//! itself.

pub mod api;
pub mod types;

pub use api::*;
pub use types::{ErrorCode, ImportProgressCallback, LocalDiscHandle};
