//! LARDER command-line entry point.
//!
//! ```text
//! larder --config larder.toml [recipes | ingredients <recipe-id> | grocery <list-id>]
//! ```
//!
//! Signs in with `LARDER_EMAIL`/`LARDER_PASSWORD` when both are set.

use larder_client::{init_tracing, ClientConfig, ClientError, Larder};
use larder_core::{AuthProvider, GroceryListId, RecipeId};

enum Command {
    Recipes,
    Ingredients(RecipeId),
    Grocery(GroceryListId),
}

fn parse_command() -> Command {
    let mut args = std::env::args().skip(1);
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        positional.push(arg);
    }

    match positional.as_slice() {
        [cmd, id] if cmd == "ingredients" => Command::Ingredients(RecipeId::from(id.as_str())),
        [cmd, id] if cmd == "grocery" => Command::Grocery(GroceryListId::from(id.as_str())),
        _ => Command::Recipes,
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = ClientConfig::load()?;
    init_tracing(&config.logging)?;
    let larder = Larder::connect(config)?;

    if let (Ok(email), Ok(password)) = (
        std::env::var("LARDER_EMAIL"),
        std::env::var("LARDER_PASSWORD"),
    ) {
        let session = larder.auth().sign_in(&email, &password).await?;
        tracing::info!(user_id = %session.user_id(), "Signed in from environment");
    }

    let result = run(&larder, parse_command()).await;
    larder.shutdown().await;
    result
}

async fn run(larder: &Larder, command: Command) -> Result<(), ClientError> {
    match command {
        Command::Recipes => {
            for recipe in larder.recipes().await? {
                let serves = recipe
                    .serving_size
                    .map(|n| format!(" (serves {n})"))
                    .unwrap_or_default();
                println!("{}\t{}{}", recipe.id, recipe.name, serves);
            }
        }
        Command::Ingredients(recipe) => {
            for ingredient in larder.ingredients(&recipe).await? {
                let unit = ingredient.unit.as_deref().unwrap_or("");
                println!(
                    "{}\t{} {} {}",
                    ingredient.id, ingredient.quantity, unit, ingredient.name
                );
            }
        }
        Command::Grocery(list) => {
            for item in larder.grocery_items(&list).await? {
                let mark = if item.is_checked { "x" } else { " " };
                println!("[{mark}] {}\t{}", item.id, item.name);
            }
        }
    }
    Ok(())
}
