use crate::domain::ports::{Pipeline, RecordCount};
use crate::utils::error::Result;
use crate::utils::monitor::RunMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: RunMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: RunMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// 依序執行 extract → transform → load，回傳輸出位置
    pub async fn run(&self) -> Result<String> {
        let name = self.pipeline.name();
        tracing::info!("🚀 Starting {} job", name);

        // Extract
        tracing::debug!("Extracting data...");
        let raw_data = self.pipeline.extract().await?;
        tracing::info!("📥 Extracted {} records", raw_data.len());
        self.monitor.log_phase("Extract");

        // Transform
        tracing::debug!("Transforming data...");
        let output = self.pipeline.transform(raw_data).await?;
        tracing::info!("🔄 Transformed into {} rows", output.record_count());
        self.monitor.log_phase("Transform");

        // Load
        tracing::debug!("Loading data...");
        let location = self.pipeline.load(output).await?;
        tracing::info!("📁 {} output: {}", name, location);
        self.monitor.log_phase("Load");

        self.monitor.log_final_stats();
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPipeline {
        loads: AtomicUsize,
        fail_extract: bool,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        type Item = u32;
        type Output = Vec<u32>;

        fn name(&self) -> &str {
            "counting"
        }

        async fn extract(&self) -> Result<Vec<u32>> {
            if self.fail_extract {
                return Err(crate::utils::error::EtlError::processing("boom"));
            }
            Ok(vec![1, 2, 3])
        }

        async fn transform(&self, data: Vec<u32>) -> Result<Vec<u32>> {
            Ok(data.into_iter().map(|n| n * 10).collect())
        }

        async fn load(&self, output: Vec<u32>) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("sum={}", output.iter().sum::<u32>()))
        }
    }

    #[tokio::test]
    async fn test_run_returns_load_location() {
        let engine = EtlEngine::new_with_monitoring(
            CountingPipeline {
                loads: AtomicUsize::new(0),
                fail_extract: false,
            },
            true,
        );
        assert_eq!(engine.run().await.unwrap(), "sum=60");
        assert_eq!(engine.pipeline().loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extract_failure_skips_load() {
        let engine = EtlEngine::new(CountingPipeline {
            loads: AtomicUsize::new(0),
            fail_extract: true,
        });
        assert!(engine.run().await.is_err());
        assert_eq!(engine.pipeline().loads.load(Ordering::SeqCst), 0);
    }
}
