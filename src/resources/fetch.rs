//! Reading decoder modules from a URL or the local file system.

#[cfg(target_arch = "wasm32")]
fn format_url(location: &str) -> anyhow::Result<reqwest::Url> {
    use anyhow::Context;

    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("page origin is not readable"))?;
    let base = reqwest::Url::parse(&format!("{}/", origin))?;
    Ok(base.join(location)?)
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("https://") || location.starts_with("http://")
}

/// Fetches `location` in full. URLs go through `reqwest`; anything else is a
/// file path natively and a path relative to the page origin on the web.
pub async fn load_binary(location: &str) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;

    if is_remote(location) {
        let response = reqwest::get(location)
            .await
            .with_context(|| format!("request to {location} failed"))?
            .error_for_status()?;
        return Ok(response.bytes().await?.to_vec());
    }

    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(location)?;
        reqwest::get(url).await?.error_for_status()?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = std::fs::read(location).with_context(|| format!("could not read {location}"))?;

    Ok(data)
}
