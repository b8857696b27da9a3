use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_seller_id},
    models::{Seller, SellerId},
    Database,
};

fn row_to_seller(row: &Row) -> Result<Seller> {
    let id: String = row.get("id")?;
    let created_at: String = row.get("created_at")?;

    Ok(Seller {
        id: parse_seller_id(&id)?,
        name: row.get("name")?,
        email: row.get("email")?,
        active: row.get("active")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_seller(&self, seller: &Seller) -> Result<()> {
        let record = seller.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sellers (id, name, email, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id.to_string(),
                    record.name,
                    record.email,
                    record.active,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_seller(&self, seller_id: SellerId) -> Result<Option<Seller>> {
        self.execute(move |conn| {
            let seller = conn
                .query_row(
                    "SELECT id, name, email, active, created_at
                     FROM sellers
                     WHERE id = ?1",
                    params![seller_id.to_string()],
                    |row| Ok(row_to_seller(row)),
                )
                .optional()?
                .transpose()?;
            Ok(seller)
        })
        .await
    }

    pub async fn list_sellers(&self) -> Result<Vec<Seller>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, active, created_at
                 FROM sellers
                 ORDER BY name ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sellers = Vec::new();
            while let Some(row) = rows.next()? {
                sellers.push(row_to_seller(row)?);
            }
            Ok(sellers)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn round_trips_sellers_sorted_by_name() {
        let db = Database::open_in_memory().unwrap();
        for name in ["Valeria Sosa", "Bruno Diaz"] {
            db.insert_seller(&Seller {
                id: SellerId::new(),
                name: name.into(),
                email: Some(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
                active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let sellers = db.list_sellers().await.unwrap();
        let names: Vec<_> = sellers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Bruno Diaz", "Valeria Sosa"]);

        let fetched = db.get_seller(sellers[0].id).await.unwrap().unwrap();
        assert_eq!(fetched, sellers[0]);
        assert!(db.get_seller(SellerId::new()).await.unwrap().is_none());
    }
}
