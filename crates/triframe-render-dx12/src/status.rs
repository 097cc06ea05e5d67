// SPDX-License-Identifier: CEPL-1.0
use triframe_render::{BackendFailure, RenderError, RenderResult, Resource};

/// HRESULT and system message of a failed call.
pub(crate) fn failure(err: &windows::core::Error, call: &str) -> BackendFailure {
    BackendFailure::with_status(err.code().0, format!("{call}: {}", err.message()))
}

pub(crate) trait StatusExt<T> {
    fn or_render(self, wrap: fn(BackendFailure) -> RenderError, call: &str) -> RenderResult<T>;
    fn or_resource(self, resource: Resource, call: &str) -> RenderResult<T>;
}

impl<T> StatusExt<T> for windows::core::Result<T> {
    fn or_render(self, wrap: fn(BackendFailure) -> RenderError, call: &str) -> RenderResult<T> {
        self.map_err(|e| wrap(failure(&e, call)))
    }

    fn or_resource(self, resource: Resource, call: &str) -> RenderResult<T> {
        self.map_err(|e| RenderError::resource(resource, failure(&e, call)))
    }
}
