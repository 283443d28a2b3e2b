use anyhow::Result;
use docsearch::SearchEngineService;

pub async fn run_exists(service: &SearchEngineService, index: &str) -> Result<()> {
    let exists = service.index_manager().has_index(index).await?;
    println!("{}", exists);
    if !exists {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn run_drop(service: &SearchEngineService, index: &str) -> Result<()> {
    service.index_manager().drop_index(index).await?;
    println!("Dropped index '{}'", index);
    Ok(())
}
