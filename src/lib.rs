//! Outbound HTTP request pipeline: declarative request descriptors routed through
//! onion-ordered interceptors (credentials, retries, logging, archival, lifecycle events),
//! dispatched through swappable transport bridges, and decoded into content-aware response
//! structs.
//!
//! The two contracts consumers rely on are "build and send a request"
//! ([`request::RequestDescriptor::send`], [`endpoint::Endpoint::send`]) and "read a
//! normalized response" ([`response::ResponseStruct`]).

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bridge;
pub mod chain;
pub mod cookie;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod obs;
pub mod observe;
pub mod request;
pub mod response;
pub mod retry;
pub mod service;

#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		bridge::{MockBridge, MockRule},
		chain::Interceptor,
		http::RawResponse,
		request::{Method, RequestDescriptor, Scheme},
	};

	/// Builds a descriptor bound to a [`MockBridge`] that answers with the provided rules.
	pub fn mock_descriptor(host: &str, rules: Vec<MockRule>) -> RequestDescriptor {
		let mut bridge = MockBridge::default();

		for rule in rules {
			bridge.push_rule(rule);
		}

		let mut descriptor = RequestDescriptor::new(Box::new(bridge));

		descriptor.set_method_kind(Method::Get).set_scheme_kind(Scheme::Https).set_host(host);

		descriptor
	}

	/// Pushes every interceptor onto the descriptor under its positional name.
	pub fn with_interceptors(
		mut descriptor: RequestDescriptor,
		interceptors: Vec<Arc<dyn Interceptor>>,
	) -> RequestDescriptor {
		for (idx, interceptor) in interceptors.into_iter().enumerate() {
			descriptor.push_interceptor(interceptor, Some(format!("interceptor-{idx}")));
		}

		descriptor
	}

	/// Canned JSON response used across integration tests.
	pub fn json_response(status: u16, body: &str) -> RawResponse {
		RawResponse::new(status)
			.with_header("content-type", "application/json")
			.with_body(body.as_bytes().to_vec())
	}
}

mod _prelude {
	pub use std::{
		any::Any,
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
