//! Address and method transforms.

use crate::message::context::BufferedContext;
use crate::transform::params::TransformParams;
use crate::transform::{BufferedTransform, TransformError};
use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

/// Swaps a literal path prefix, e.g. `/api/products` to `/catalog`.
pub struct PathPrefixRewrite {
    from: String,
    to: String,
}

impl PathPrefixRewrite {
    pub const NAME: &'static str = "path-prefix-rewrite";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            from: params.require_string("from")?,
            to: params.require_string("to")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for PathPrefixRewrite {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        ctx.address().path().starts_with(&self.from)
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let rest = ctx.address().path()[self.from.len()..].to_string();
        let rewritten = format!("{}{}", self.to, rest);
        ctx.address_mut().set_path(&rewritten);
        Ok(())
    }
}

/// Regex path rewrite; the pattern is compiled once at configure time. The
/// regex engine guarantees linear-time matching, so no match deadline is
/// needed.
pub struct PathRegexRewrite {
    pattern: Regex,
    replacement: String,
}

impl PathRegexRewrite {
    pub const NAME: &'static str = "path-regex-rewrite";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        let raw = params.require_string("pattern")?;
        let pattern = Regex::new(&raw)
            .map_err(|err| TransformError::invalid("pattern", err.to_string()))?;
        Ok(Self {
            pattern,
            replacement: params.require_string("replacement")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for PathRegexRewrite {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        self.pattern.is_match(ctx.address().path())
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let rewritten = self
            .pattern
            .replace(ctx.address().path(), self.replacement.as_str())
            .into_owned();
        ctx.address_mut().set_path(&rewritten);
        Ok(())
    }
}

pub struct AddQueryParam {
    name: String,
    value: String,
}

impl AddQueryParam {
    pub const NAME: &'static str = "add-query-param";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            name: params.require_string("name")?,
            value: params.require_string("value")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for AddQueryParam {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.address_mut().set_query_param(&self.name, &self.value);
        Ok(())
    }
}

pub struct RemoveQueryParam {
    name: String,
}

impl RemoveQueryParam {
    pub const NAME: &'static str = "remove-query-param";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            name: params.require_string("name")?,
        })
    }
}

#[async_trait]
impl BufferedTransform for RemoveQueryParam {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.address_mut().remove_query_param(&self.name);
        Ok(())
    }
}

/// Redirects the exchange at a different backend host, optionally switching
/// port and scheme.
pub struct HostRewrite {
    host: String,
    port: Option<u16>,
    scheme: Option<String>,
}

impl HostRewrite {
    pub const NAME: &'static str = "host-rewrite";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        let port = match params.int("port") {
            Some(value) => Some(u16::try_from(value).map_err(|_| {
                TransformError::invalid("port", format!("`{value}` is out of range"))
            })?),
            None => None,
        };
        Ok(Self {
            host: params.require_string("host")?,
            port,
            scheme: params.string("scheme"),
        })
    }
}

#[async_trait]
impl BufferedTransform for HostRewrite {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        if let Some(scheme) = &self.scheme {
            ctx.address_mut().set_scheme(scheme)?;
        }
        ctx.address_mut().set_host(&self.host)?;
        if self.port.is_some() {
            ctx.address_mut().set_port(self.port)?;
        }
        Ok(())
    }
}

/// Overrides the HTTP method, optionally only when the current method
/// matches. No effect on the response side.
pub struct MethodOverride {
    method: String,
    only_method: Option<String>,
}

impl MethodOverride {
    pub const NAME: &'static str = "method-override";

    pub fn from_params(params: &TransformParams) -> Result<Self, TransformError> {
        Ok(Self {
            method: params.require_string("method")?.to_ascii_uppercase(),
            only_method: params
                .string("onlyMethod")
                .map(|method| method.to_ascii_uppercase()),
        })
    }
}

#[async_trait]
impl BufferedTransform for MethodOverride {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_apply(&self, ctx: &BufferedContext<'_>) -> bool {
        match &self.only_method {
            Some(expected) => ctx.method().eq_ignore_ascii_case(expected),
            None => true,
        }
    }

    async fn apply(
        &self,
        ctx: &mut BufferedContext<'_>,
        _cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        ctx.set_method(self.method.clone());
        Ok(())
    }
}
