use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::info;
use tracing::warn;

#[derive(Debug, Deserialize, Default)]
struct TunnelList {
  #[serde(default)]
  tunnels: Vec<Tunnel>,
}

#[derive(Debug, Deserialize)]
struct Tunnel {
  #[serde(default)]
  public_url: Option<String>,
}

/// Resolves the public base URL that relative media paths are joined to.
///
/// Order: explicit override, then the first tunnel reported by the local
/// tunnel agent, then the backend URL without its `/api` suffix. The first
/// resolution is cached for the process lifetime.
pub struct MediaUrls {
  override_url: Option<String>,
  tunnel_api_url: String,
  backend_url: String,
  client: reqwest::Client,
  resolved: OnceCell<String>,
}

impl MediaUrls {
  pub fn new(
    override_url: Option<String>,
    tunnel_api_url: String,
    backend_url: String,
    client: reqwest::Client,
  ) -> Self {
    Self {
      override_url,
      tunnel_api_url,
      backend_url,
      client,
      resolved: OnceCell::new(),
    }
  }

  pub async fn base_url(&self) -> &str {
    self.resolved.get_or_init(|| self.resolve()).await
  }

  pub async fn media_url(&self, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
      return path.to_string();
    }
    format!("{}/{}", self.base_url().await, path.trim_start_matches('/'))
  }

  async fn resolve(&self) -> String {
    if let Some(url) = &self.override_url {
      return url.trim_end_matches('/').to_string();
    }

    match self.discover_tunnel().await {
      Ok(Some(url)) => {
        info!(url = %url, "using tunnel url for media");
        return url;
      },
      Ok(None) => info!("tunnel agent reported no public url"),
      Err(err) => warn!(error = %err, "failed to query tunnel agent"),
    }

    let fallback = fallback_base(&self.backend_url);
    info!(url = %fallback, "using backend url for media");
    fallback
  }

  async fn discover_tunnel(&self) -> Result<Option<String>, reqwest::Error> {
    let response = self.client.get(&self.tunnel_api_url).send().await?;
    if !response.status().is_success() {
      return Ok(None);
    }
    let list: TunnelList = response.json().await?;
    Ok(first_public_url(list))
  }
}

fn first_public_url(list: TunnelList) -> Option<String> {
  list
    .tunnels
    .into_iter()
    .filter_map(|tunnel| tunnel.public_url)
    .find(|url| !url.is_empty())
    .map(|url| url.trim_end_matches('/').to_string())
}

fn fallback_base(backend_url: &str) -> String {
  let base = match backend_url.find("/api") {
    Some(index) => &backend_url[.. index],
    None => backend_url,
  };
  base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::MediaUrls;
  use super::TunnelList;
  use super::fallback_base;
  use super::first_public_url;

  #[test]
  fn strips_api_suffix_from_backend_url() {
    assert_eq!(fallback_base("http://server:5050/api"), "http://server:5050");
    assert_eq!(fallback_base("http://server:5050/"), "http://server:5050");
  }

  #[test]
  fn picks_first_tunnel_with_public_url() {
    let list: TunnelList = serde_json::from_value(json!({
      "tunnels": [{ "name": "cmd" }, { "public_url": "https://abc.ngrok.app/" }]
    }))
    .unwrap();
    assert_eq!(first_public_url(list), Some("https://abc.ngrok.app".to_string()));
  }

  #[tokio::test]
  async fn override_wins_and_paths_are_joined() {
    let media = MediaUrls::new(
      Some("https://shop.example/".to_string()),
      "http://127.0.0.1:9/api/tunnels".to_string(),
      "http://server:5050/api".to_string(),
      reqwest::Client::new(),
    );
    assert_eq!(media.media_url("/static/a.jpg").await, "https://shop.example/static/a.jpg");
    assert_eq!(media.media_url("https://cdn.example/b.jpg").await, "https://cdn.example/b.jpg");
  }
}
