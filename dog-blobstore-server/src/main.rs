use anyhow::Result;
use dog_blobstore_server::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env();
    let app = dog_blobstore_server::build(&settings).await?;

    let addr = settings.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("[blobstore] listening on http://{addr} ({} backend)", settings.backend);

    axum::serve(listener, app).await?;

    Ok(())
}
