use std::env;
use std::error::Error;

use supabase_auth::SupabaseClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::from_filename(".env.local").ok();

    let client = SupabaseClient::from_env()?;
    let email = env::var("SUPABASE_EMAIL")?;
    let password = env::var("SUPABASE_PASSWORD")?;

    let session = client.sign_in_with_password(&email, &password).await?;
    let issued_at = chrono::Utc::now();
    println!(
        "Signed in as {} (expires {})",
        session.user.email.as_deref().unwrap_or(&session.user.id),
        session.expiry(issued_at)?
    );

    let refreshed = client.refresh_session(&session.refresh_token).await?;
    println!(
        "Refreshed, new expiry {}",
        refreshed.expiry(chrono::Utc::now())?
    );

    let user = client.get_user(&refreshed.access_token).await?;
    println!("Token belongs to user {}", user.id);

    client.sign_out(&refreshed.access_token).await?;
    Ok(())
}
