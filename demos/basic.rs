use backoffice_http::{HttpPipeline, SessionState};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let email = std::env::var("BACKOFFICE_EMAIL")?;
    let password = std::env::var("BACKOFFICE_PASSWORD")?;

    let api = HttpPipeline::from_env()?;

    api.auth().login(&email, &password).await?;
    assert_eq!(api.session_state(), SessionState::Authenticated);

    let merchants = api.merchants().list(json!({ "limit": 20 })).await?;
    println!("merchants: {}", merchants.data);

    match api.forms().my_latest().await? {
        Some(form) => println!("latest form: {form}"),
        None => println!("no form submitted yet"),
    }

    api.auth().logout().await?;
    Ok(())
}
