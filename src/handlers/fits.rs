//! FITS header assembly.
//!
//! Before an exposure the C layer's header list is cleared, filled from the static keyword
//! table in the settings, then extended with the cards the ISS returns for GET_FITS. Keywords
//! are sent one line at a time; the first failure stops the assembly. Cards already sent stay
//! in the C layer.

use super::HandlerContext;
use crate::error::ErrorSite;
use crate::network::protocol::{CommandResult, Completion, FitsCard, FitsValue, IssCommand};
use tracing::{debug, error, info};

/// Writes FITS headers to the C layer for one command.
pub struct FitsHeaderAssembler<'a> {
    ctx: &'a HandlerContext,
}

impl<'a> FitsHeaderAssembler<'a> {
    /// Assembler using the command's C layer and ISS relay.
    pub fn new(ctx: &'a HandlerContext) -> Self {
        Self { ctx }
    }

    /// Clear, static table, then ISS cards.
    pub async fn assemble(&self) -> Result<(), Completion> {
        self.clear().await?;
        self.set_from_settings().await?;
        self.merge_from_iss().await
    }

    /// Empties the C layer header list.
    pub async fn clear(&self) -> Result<(), Completion> {
        self.ctx.c_layer.fits_header_clear().await.map_err(|e| {
            error!("clearFitsHeaders: {e}");
            Completion::failure(
                ErrorSite::FitsAdd,
                format!("clearFitsHeaders:Failed to clear FITS headers:{e}"),
            )
        })
    }

    /// Sends every keyword of the gap-terminated `[fits.keyword]` table.
    pub async fn set_from_settings(&self) -> Result<(), Completion> {
        for entry in self.ctx.settings.fits_keywords() {
            let keyword = entry.name.as_str();
            let Some(value_type) = entry.value_type.as_deref() else {
                let message =
                    format!("setFitsHeaders:Failed to get value type for keyword:{keyword}");
                error!("{message}");
                return Err(Completion::failure(ErrorSite::FitsMissingType, message));
            };
            if !FitsValue::is_known_type(value_type) {
                let message = format!(
                    "setFitsHeaders:Unknown value type {value_type} for keyword:{keyword}"
                );
                error!("{message}");
                return Err(Completion::failure(ErrorSite::FitsUnknownType, message));
            }

            let add_failed = |e: &dyn std::fmt::Display| {
                let message =
                    format!("setFitsHeaders:Failed to add value for keyword:{keyword}:{e}");
                error!("{message}");
                Completion::failure(ErrorSite::FitsAdd, message)
            };
            let raw = entry.value.as_deref().ok_or_else(|| {
                add_failed(&format!("property 'fits.keyword.{keyword}.value' is not set"))
            })?;
            let value = FitsValue::from_typed(value_type, raw).map_err(|e| add_failed(&e))?;
            debug!(keyword, value = %value.to_line_argument(), "Adding configured FITS header");
            self.ctx
                .c_layer
                .fits_header_add(keyword, &value)
                .await
                .map_err(|e| add_failed(&e))?;
        }
        Ok(())
    }

    /// Fetches the ISS card list and forwards every card, with its comment and units.
    pub async fn merge_from_iss(&self) -> Result<(), Completion> {
        let done = self
            .ctx
            .iss
            .send(IssCommand::GetFits, &self.ctx.acknowledger, &self.ctx.abort)
            .await;
        if !done.successful {
            error!(error_num = done.error_num, "getFitsHeadersFromISS: {}", done.error_string);
            return Err(Completion::failure(ErrorSite::FitsFromIss, done.error_string));
        }
        let cards = match done.result {
            Some(CommandResult::FitsHeaders { cards }) => cards,
            _ => Vec::new(),
        };
        info!(count = cards.len(), "Adding ISS FITS headers");
        for card in &cards {
            self.add_card(card).await.map_err(|e| {
                let message = format!("getFitsHeadersFromISS:addISSFitsHeaderList failed:{e}");
                error!("{message}");
                Completion::failure(ErrorSite::FitsIssListAdd, message)
            })?;
        }
        Ok(())
    }

    async fn add_card(&self, card: &FitsCard) -> crate::error::AppResult<()> {
        let c_layer = &self.ctx.c_layer;
        c_layer.fits_header_add(&card.keyword, &card.value).await?;
        if let Some(comment) = card.comment.as_deref().filter(|c| !c.is_empty()) {
            c_layer.fits_header_add_comment(&card.keyword, comment).await?;
        }
        if let Some(units) = card.units.as_deref().filter(|u| !u.is_empty()) {
            c_layer.fits_header_add_units(&card.keyword, units).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{context, iss_done, settings_toml, FakeCLayer, FakeIss};

    const KEYWORDS: &str = r#"
        [fits.keyword.0]
        name = "INSTRUME"
        value_type = "string"
        value = "Liric"

        [fits.keyword.1]
        name = "CCDXBIN"
        value_type = "integer"
        value = "1"
    "#;

    fn cards() -> CommandResult {
        CommandResult::FitsHeaders {
            cards: vec![
                FitsCard {
                    keyword: "AIRMASS".into(),
                    value: FitsValue::Float(1.5),
                    comment: Some("Airmass at start".into()),
                    units: None,
                },
                FitsCard {
                    keyword: "ROTSKYPA".into(),
                    value: FitsValue::Integer(90),
                    comment: Some(String::new()),
                    units: Some("degrees".into()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn assembly_sends_clear_static_then_iss_cards() {
        let c_layer = FakeCLayer::start(vec![]).await;
        let iss = FakeIss::start(vec![iss_done(Completion::success(Some(cards())))]).await;
        let test = context(settings_toml(c_layer.port, iss.port, KEYWORDS));

        FitsHeaderAssembler::new(&test.ctx).assemble().await.unwrap();
        assert_eq!(
            c_layer.received(),
            vec![
                "fitsheader clear",
                "fitsheader add INSTRUME string Liric",
                "fitsheader add CCDXBIN integer 1",
                "fitsheader add AIRMASS float 1.5",
                "fitsheader add AIRMASS comment Airmass at start",
                "fitsheader add ROTSKYPA integer 90",
                "fitsheader add ROTSKYPA units degrees",
            ]
        );
    }

    #[tokio::test]
    async fn missing_and_unknown_types_have_their_own_codes() {
        let c_layer = FakeCLayer::start(vec![]).await;
        let missing = context(settings_toml(
            c_layer.port,
            1,
            r#"
            [fits.keyword.0]
            name = "OBSERVER"
            value = "nobody"
            "#,
        ));
        let err = FitsHeaderAssembler::new(&missing.ctx)
            .set_from_settings()
            .await
            .unwrap_err();
        assert_eq!(err.error_num, ErrorSite::FitsMissingType.code());

        let unknown = context(settings_toml(
            c_layer.port,
            1,
            r#"
            [fits.keyword.0]
            name = "OBSERVER"
            value_type = "date"
            value = "2024-01-01"
            "#,
        ));
        let err = FitsHeaderAssembler::new(&unknown.ctx)
            .set_from_settings()
            .await
            .unwrap_err();
        assert_eq!(err.error_num, ErrorSite::FitsUnknownType.code());
        assert!(c_layer.received().is_empty());
    }

    #[tokio::test]
    async fn bad_numeric_value_is_an_add_failure() {
        let c_layer = FakeCLayer::start(vec![]).await;
        let test = context(settings_toml(
            c_layer.port,
            1,
            r#"
            [fits.keyword.0]
            name = "CCDXBIN"
            value_type = "integer"
            value = "one"
            "#,
        ));
        let err = FitsHeaderAssembler::new(&test.ctx)
            .set_from_settings()
            .await
            .unwrap_err();
        assert_eq!(err.error_num, ErrorSite::FitsAdd.code());
        assert!(err.error_string.contains("CCDXBIN"));
    }

    #[tokio::test]
    async fn downstream_rejection_of_iss_card_stops_assembly() {
        let c_layer = FakeCLayer::start(vec![("fitsheader add AIRMASS", "5 list full")]).await;
        let iss = FakeIss::start(vec![iss_done(Completion::success(Some(cards())))]).await;
        let test = context(settings_toml(c_layer.port, iss.port, ""));

        let err = FitsHeaderAssembler::new(&test.ctx)
            .merge_from_iss()
            .await
            .unwrap_err();
        assert_eq!(err.error_num, ErrorSite::FitsIssListAdd.code());
        assert!(err.error_string.contains("list full"));
        assert_eq!(c_layer.received().len(), 1);
    }

    #[tokio::test]
    async fn iss_card_with_line_break_is_not_sent() {
        let c_layer = FakeCLayer::start(vec![]).await;
        let card = CommandResult::FitsHeaders {
            cards: vec![FitsCard {
                keyword: "OBJECT".into(),
                value: FitsValue::String("M31".into()),
                comment: Some("target\nshutdown".into()),
                units: None,
            }],
        };
        let iss = FakeIss::start(vec![iss_done(Completion::success(Some(card)))]).await;
        let test = context(settings_toml(c_layer.port, iss.port, ""));

        let err = FitsHeaderAssembler::new(&test.ctx)
            .merge_from_iss()
            .await
            .unwrap_err();
        assert_eq!(err.error_num, ErrorSite::FitsIssListAdd.code());
        assert_eq!(c_layer.received(), vec!["fitsheader add OBJECT string M31"]);
    }

    #[tokio::test]
    async fn refused_get_fits_is_reported() {
        let iss = FakeIss::start(vec![iss_done(Completion::failure_code(3, "no telescope"))]).await;
        let test = context(settings_toml(1, iss.port, ""));
        let err = FitsHeaderAssembler::new(&test.ctx)
            .merge_from_iss()
            .await
            .unwrap_err();
        assert_eq!(err.error_num, ErrorSite::FitsFromIss.code());
    }
}
