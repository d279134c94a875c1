//! Print the OpenAPI document of the waitlist server

use anyhow::Result;
use utoipa::OpenApi;
use waitlist_server::docs::ApiDoc;

fn main() -> Result<()> {
    println!("{}", ApiDoc::openapi().to_pretty_json()?);
    Ok(())
}
