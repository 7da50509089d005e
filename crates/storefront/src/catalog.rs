//! Public catalog lookups. No sign-in needed; errors go straight to the caller.

use tracing::instrument;

use crate::context::Storefront;
use crate::gateway::{Category, GatewayResult, Product, ProductQuery};

impl Storefront {
    /// One page of the catalog. Blank filters are not sent.
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> GatewayResult<Vec<Product>> {
        self.gateway.products(query).await
    }

    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` for an unknown slug.
    pub async fn product(&self, slug: &str) -> GatewayResult<Product> {
        self.gateway.product(slug.trim()).await
    }

    /// # Errors
    ///
    /// Returns the gateway error when the request fails.
    pub async fn categories(&self) -> GatewayResult<Vec<Category>> {
        self.gateway.categories().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::context::tests::storefront;
    use crate::gateway::{GatewayError, ProductQuery};

    #[tokio::test]
    async fn test_catalog_is_public() {
        let (sf, fake) = storefront();
        fake.add_product(1, "Yirgacheffe Beans", 650);
        fake.add_product(2, "Clay Jebena", 450);

        let query = ProductQuery {
            search: Some("jebena".to_string()),
            ..Default::default()
        };
        let found = sf.products(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Clay Jebena");

        let product = sf.product(" clay-jebena ").await.unwrap();
        assert_eq!(product.id, found[0].id);

        assert!(matches!(
            sf.product("missing").await,
            Err(GatewayError::NotFound(_))
        ));
        assert_eq!(sf.categories().await.unwrap()[0].slug, "coffee");
    }
}
