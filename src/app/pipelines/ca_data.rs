use super::ca_details::CaDetailsPipeline;
use super::combine::CombinePipeline;
use super::{ca_details_file, COMBINED_DOMAINS_CSV};
use crate::core::etl::EtlEngine;
use crate::domain::model::CaKind;
use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};

/// 刪除舊檔 → 兩家 CA 明細並行 → 都成功才合併
pub struct CaDataJob<S: Storage> {
    storage: S,
    digicert: CaDetailsPipeline<S>,
    sectigo: CaDetailsPipeline<S>,
    combine: CombinePipeline<S>,
    monitor: bool,
}

impl<S: Storage> CaDataJob<S> {
    pub fn new(
        storage: S,
        digicert: CaDetailsPipeline<S>,
        sectigo: CaDetailsPipeline<S>,
        combine: CombinePipeline<S>,
        monitor: bool,
    ) -> Self {
        Self {
            storage,
            digicert,
            sectigo,
            combine,
            monitor,
        }
    }

    async fn remove_old_data_files(&self) -> Result<()> {
        for file in [
            COMBINED_DOMAINS_CSV.to_string(),
            ca_details_file(CaKind::DigiCert),
            ca_details_file(CaKind::Sectigo),
        ] {
            if self.storage.remove_file(&file).await? {
                tracing::info!("🗑️ Removed {}", self.storage.display_path(&file));
            }
        }
        Ok(())
    }

    pub async fn run(self) -> Result<String> {
        self.remove_old_data_files().await?;

        let digicert = EtlEngine::new_with_monitoring(self.digicert, self.monitor);
        let sectigo = EtlEngine::new_with_monitoring(self.sectigo, self.monitor);
        let (digicert_result, sectigo_result) = tokio::join!(digicert.run(), sectigo.run());

        let mut failures = Vec::new();
        for (ca, result) in [(CaKind::DigiCert, &digicert_result), (CaKind::Sectigo, &sectigo_result)] {
            match result {
                Ok(path) => tracing::info!("✅ {} details written to {}", ca, path),
                Err(e) => {
                    tracing::error!("❌ {} details failed: {}", ca, e);
                    failures.push(format!("{}: {}", ca, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(EtlError::JobError {
                job: "ca-data".to_string(),
                message: format!("skipping combine; {}", failures.join("; ")),
            });
        }

        EtlEngine::new_with_monitoring(self.combine, self.monitor)
            .run()
            .await
    }
}
