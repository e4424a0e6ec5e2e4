//! Loading ratings and item metadata from CSV files.
use std::path::Path;

use csv;
use failure;

use super::data::{ItemMetadata, Rating};

/// Read ratings from a CSV file with a `user,item,rating` header.
pub fn load_ratings<P: AsRef<Path>>(path: P) -> Result<Vec<Rating>, failure::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let ratings = reader.deserialize().collect::<Result<Vec<Rating>, _>>()?;

    Ok(ratings)
}

/// Read item metadata from a CSV file with an
/// `item_id,title,plot,metadata` header.
pub fn load_items<P: AsRef<Path>>(path: P) -> Result<Vec<ItemMetadata>, failure::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let items = reader
        .deserialize()
        .collect::<Result<Vec<ItemMetadata>, _>>()?;

    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use super::*;

    #[test]
    fn load_csv_files() {
        let dir = env::temp_dir().join(format!("recs-datasets-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let ratings_path = dir.join("ratings.csv");
        fs::write(&ratings_path, "user,item,rating\n1,10,4.5\n2,11,3\n").unwrap();

        let items_path = dir.join("items.csv");
        fs::write(
            &items_path,
            "item_id,title,plot,metadata\n10,Invaders,\"space aliens, invading\",scifi\n",
        )
        .unwrap();

        let ratings = load_ratings(&ratings_path).unwrap();
        assert_eq!(
            ratings,
            vec![Rating::new(1, 10, 4.5), Rating::new(2, 11, 3.0)]
        );

        let items = load_items(&items_path).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_id, 10);
        assert_eq!(items[0].plot, "space aliens, invading");

        assert!(load_ratings(dir.join("missing.csv")).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
