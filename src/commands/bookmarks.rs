use clap::Subcommand;
use gpxtagger::{Bookmark, Bookmarks};
use std::error::Error;
use std::path::Path;

#[derive(Subcommand)]
pub enum Action {
    #[command(about = "Print every bookmark with its id")]
    List,
    #[command(about = "Add a bookmark and save the file")]
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    #[command(about = "Delete a bookmark by id and save the file")]
    Delete { id: String },
    #[command(about = "Print bookmarks whose name contains TEXT")]
    Find { text: String },
}

fn print_entry(id: &str, bookmark: &Bookmark) {
    println!("{id}\t{}\t{}\t{}", bookmark.lat, bookmark.lon, bookmark.name);
}

pub fn bookmarks_command(path: &Path, action: Action) -> Result<(), Box<dyn Error>> {
    let mut bookmarks = Bookmarks::open(path);

    match action {
        Action::List => {
            for (id, bookmark) in bookmarks.iter() {
                print_entry(&id, bookmark);
            }
        }
        Action::Add { name, lat, lon } => {
            let id = bookmarks.add(Bookmark::new(name, lat, lon))?;
            println!("{id}");
        }
        Action::Delete { id } => {
            if !bookmarks.delete(&id)? {
                return Err(format!("No bookmark with id {id}").into());
            }
        }
        Action::Find { text } => {
            for (id, bookmark) in bookmarks.find(&text) {
                print_entry(&id, bookmark);
            }
        }
    }

    Ok(())
}
