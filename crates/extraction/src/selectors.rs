//! Known retailers and the CSS selectors their product pages expose prices under.

/// Retailer a product page belongs to. Unknown identifiers map to `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    Amazon,
    MercadoLivre,
    Americanas,
    MagazineLuiza,
    Submarino,
    CasasBahia,
    Generic,
}

const AMAZON: &[&str] = &[
    ".a-price.a-text-price.a-size-medium.apexPriceToPay .a-offscreen",
    "#corePriceDisplay_desktop_feature_div .a-offscreen",
    "#corePrice_feature_div .a-offscreen",
    "#apex_desktop .a-offscreen",
    ".apexPriceToPay .a-offscreen",
    "#price_inside_buybox",
    "#priceblock_dealprice",
    "#priceblock_ourprice",
    "span.a-price .a-offscreen",
    ".a-price-whole",
    ".a-price-range",
    ".a-price",
];

const MERCADO_LIVRE: &[&str] = &[
    ".andes-money-amount__fraction",
    ".price-tag-fraction",
    ".ui-pdp-price__fraction",
    ".andes-money-amount",
];

const B2W: &[&str] = &[
    "[data-testid='price-value']",
    ".price-template__text",
    "[class*='src__Text-sc']",
];

const MAGAZINE_LUIZA: &[&str] = &[
    "[data-testid='price-value']",
    ".price-template__text",
    ".price",
];

/// Tried for every store after its own selectors come up empty.
pub const GENERIC: &[&str] = &[
    "[class*='price']",
    "[id*='price']",
    "[data-price]",
    ".value",
    ".amount",
    "[itemprop='price']",
];

impl Store {
    /// Resolve a registry store identifier such as `MERCADO_LIVRE`.
    ///
    /// Matching ignores case and treats `-` and spaces like `_`.
    pub fn from_hint(hint: &str) -> Self {
        let normalized: String = hint
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();

        match normalized.as_str() {
            "AMAZON" => Store::Amazon,
            "MERCADO_LIVRE" | "MERCADOLIVRE" => Store::MercadoLivre,
            "AMERICANAS" => Store::Americanas,
            "MAGAZINE_LUIZA" | "MAGALU" => Store::MagazineLuiza,
            "SUBMARINO" => Store::Submarino,
            "CASAS_BAHIA" => Store::CasasBahia,
            _ => Store::Generic,
        }
    }

    /// Store-specific selectors in priority order (empty for `Generic`).
    pub fn selectors(&self) -> &'static [&'static str] {
        match self {
            Store::Amazon => AMAZON,
            Store::MercadoLivre => MERCADO_LIVRE,
            Store::Americanas | Store::Submarino | Store::CasasBahia => B2W,
            Store::MagazineLuiza => MAGAZINE_LUIZA,
            Store::Generic => &[],
        }
    }
}
