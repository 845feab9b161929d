use crate::RemoteError;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A normalized repository session URL.
///
/// The session layer does not interpret the scheme; it is chosen by the
/// engine factory that opened the connection (`svn://`, `https://`,
/// `file://`, a tunnel scheme, ...). The parsed URL is normalized to a
/// lowercase scheme and host, an explicit path (defaulting to `/`), and no
/// trailing slash.
pub struct SessionUrl {
    /// Lowercase URL scheme, without the `://` separator.
    pub scheme: String,
    /// Hostname (or IP) portion of the URL; may be empty for `file://`.
    pub host: String,
    /// Explicit TCP port, if one was given.
    pub port: Option<u16>,
    /// Absolute repository path portion (always starts with `/`).
    pub path: String,
    /// Full normalized URL string.
    pub url: String,
}

impl SessionUrl {
    /// Parses and normalizes a `scheme://host[:port]/path` URL.
    ///
    /// # Examples
    ///
    /// ```
    /// # use svn_remote::SessionUrl;
    /// let url = SessionUrl::parse("svn://example.com/repo/trunk/").unwrap();
    /// assert_eq!(url.url, "svn://example.com/repo/trunk");
    /// ```
    pub fn parse(input: &str) -> Result<Self, RemoteError> {
        let input = input.trim();
        let Some((scheme, rest)) = input.split_once("://") else {
            return Err(RemoteError::InvalidUrl(format!(
                "missing scheme in url: {input}"
            )));
        };
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(RemoteError::InvalidUrl(format!(
                "invalid scheme in url: {input}"
            )));
        }
        let scheme = scheme.to_ascii_lowercase();

        let (authority, path) = match rest.split_once('/') {
            Some((authority, p)) => (authority, format!("/{p}")),
            None => (rest, "/".to_string()),
        };

        if authority.contains('@') {
            return Err(RemoteError::InvalidUrl(
                "userinfo in session urls is not supported; credentials belong to the engine factory"
                    .to_string(),
            ));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, port_str)) => {
                let port = port_str.parse::<u16>().map_err(|_| {
                    RemoteError::InvalidUrl(format!("invalid port in url: {input}"))
                })?;
                (h.to_ascii_lowercase(), Some(port))
            }
            None => (authority.to_ascii_lowercase(), None),
        };

        if host.is_empty() && scheme != "file" {
            return Err(RemoteError::InvalidUrl(format!(
                "missing host in url: {input}"
            )));
        }

        let path = normalize_path(&path)?;
        let port_part = port.map(|p| format!(":{p}")).unwrap_or_default();
        let path_part = if path == "/" { "" } else { path.as_str() };
        let url = format!("{scheme}://{host}{port_part}{path_part}");

        Ok(Self {
            scheme,
            host,
            port,
            path,
            url,
        })
    }

    /// Returns `true` if `other` points into the same repository authority
    /// and at or below this URL's path.
    pub fn is_ancestor_of(&self, other: &SessionUrl) -> bool {
        self.relative_path_of(other).is_some()
    }

    /// Returns the path of `other` relative to this URL (`""` when equal),
    /// or `None` if this URL is not an ancestor of `other`.
    pub fn relative_path_of(&self, other: &SessionUrl) -> Option<String> {
        if self.scheme != other.scheme || self.host != other.host || self.port != other.port {
            return None;
        }
        if self.path == "/" {
            return Some(other.path.trim_start_matches('/').to_string());
        }
        if other.path == self.path {
            return Some(String::new());
        }
        other
            .path
            .strip_prefix(&self.path)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| rest.to_string())
    }
}

fn normalize_path(path: &str) -> Result<String, RemoteError> {
    let mut parts = Vec::new();
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(RemoteError::InvalidUrl("unsafe path in url".to_string()));
        }
        parts.push(seg);
    }
    if parts.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

impl std::fmt::Display for SessionUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for SessionUrl {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
