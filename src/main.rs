use anyhow::Context;
use clap::Parser;
use ops_etl::adapters::azure::{AzureClient, AzureCnamePublisher};
use ops_etl::adapters::digicert::DigiCertClient;
use ops_etl::adapters::dns::resolver_for;
use ops_etl::adapters::mail::Mailer;
use ops_etl::adapters::market::{FinnhubClient, TwelveDataClient};
use ops_etl::adapters::ocr::OcrTools;
use ops_etl::adapters::sectigo::SectigoClient;
use ops_etl::app::pipelines::{
    self, azure_dns_report, ca_data::CaDataJob, ca_details::{CaDetailsPipeline, DetailSource},
    combine::CombinePipeline, dc_add::DcAddPipeline, dcv_tokens::DcvTokensPipeline, domain_admin,
    domain_lookup::DomainLookupPipeline, domain_validator, futures_email::FuturesEmailPipeline,
    gaps::GapsPipeline, hosts_check, ocr_batch::OcrBatchPipeline, portfolio,
    sectigo_add_all::SectigoAddAllPipeline, sectigo_dcv::SectigoDcvPipeline, stock_news::StockNewsPipeline,
    valuation::ValuationPipeline,
};
use ops_etl::domain::model::{CaKind, Holding};
use ops_etl::utils::audit::AuditLog;
use ops_etl::utils::{logger, validation::Validate};
use ops_etl::{ApiVault, Cli, Command, EtlEngine, EtlError, LocalStorage, Pipeline, Result, Settings, StocksCommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

async fn run_pipeline<P: Pipeline>(pipeline: P, monitor: bool) -> Result<String> {
    EtlEngine::new_with_monitoring(pipeline, monitor).run().await
}

fn load_vault(cli: &Cli) -> Result<ApiVault> {
    ApiVault::load(cli.vault.as_deref())
}

fn holdings_store(settings: &Settings) -> portfolio::HoldingsStore<LocalStorage> {
    portfolio::HoldingsStore::new(
        LocalStorage::new(settings.paths.data_dir.clone()),
        &settings.stocks.portfolio_csv,
        &settings.stocks.portfolio_json,
    )
}

fn finnhub(settings: &Settings, vault: &ApiVault) -> Result<FinnhubClient> {
    FinnhubClient::new(&settings.endpoints.finnhub, &vault.finnhub_key()?)
}

async fn azure_client(settings: &Settings, vault: &ApiVault) -> Result<(AzureClient, Option<String>)> {
    let creds = vault.azure()?;
    let client = AzureClient::connect(
        &creds,
        &settings.endpoints.azure_login,
        &settings.endpoints.azure_management,
    )
    .await?;
    Ok((client, creds.subscription_id))
}

/// `--domain` / `--file` 都沒給時回傳 `None`
fn optional_domain_list(domain: Option<&str>, file: Option<&Path>) -> Result<Option<Vec<String>>> {
    if domain.is_none() && file.is_none() {
        return Ok(None);
    }
    pipelines::read_domain_list(domain, file).map(Some)
}

fn ca_details_pipeline(settings: &Settings, vault: &ApiVault, ca: CaKind) -> Result<CaDetailsPipeline<LocalStorage>> {
    let source = match ca {
        CaKind::DigiCert => {
            let creds = vault.digicert()?;
            DetailSource::DigiCert(DigiCertClient::new(&settings.endpoints.digicert, &creds.api_key)?)
        }
        CaKind::Sectigo => {
            DetailSource::Sectigo(SectigoClient::new(&settings.endpoints.sectigo, &vault.sectigo()?)?)
        }
    };
    Ok(CaDetailsPipeline::new(
        LocalStorage::new(settings.paths.data_dir.clone()),
        source,
        settings.jobs.concurrency,
    ))
}

/// combine 不一定需要 vault；沒有 vault 時直接用 DoH
fn combine_pipeline(settings: &Settings, vault: Option<&ApiVault>) -> Result<CombinePipeline<LocalStorage>> {
    let resolver = vault.and_then(ApiVault::dns_resolver);
    Ok(CombinePipeline::new(
        LocalStorage::new(settings.paths.data_dir.clone()),
        resolver_for(resolver.as_deref(), &settings.endpoints.dns_over_https)?,
        settings.jobs.concurrency,
    ))
}

async fn run_stocks(cli: &Cli, settings: &Settings, command: &StocksCommand) -> Result<String> {
    let store = holdings_store(settings);
    match command {
        StocksCommand::Add {
            ticker,
            date,
            shares,
            price,
        } => {
            let holding = Holding {
                ticker: ticker.trim().to_uppercase(),
                purchase_date: date.trim().to_string(),
                shares: *shares,
                purchase_price: *price,
            };
            let total = store.add(holding).await?;
            println!("Portfolio now has {} holdings", total);
            Ok(settings.data_path(&settings.stocks.portfolio_csv))
        }
        StocksCommand::Report { email, dry_run } => {
            let vault = load_vault(cli)?;
            let mailer = if *email {
                Some(Mailer::from_vault(&vault, settings.email.tls, *dry_run)?)
            } else {
                None
            };
            let pipeline = portfolio::PortfolioReportPipeline::new(
                store,
                LocalStorage::new(settings.paths.report_dir.clone()),
                &settings.stocks.report_file,
                Arc::new(finnhub(settings, &vault)?),
                mailer,
            );
            run_pipeline(pipeline, cli.monitor).await
        }
        StocksCommand::Pnl => {
            let vault = load_vault(cli)?;
            let pipeline = portfolio::PnlPipeline::new(store, Arc::new(finnhub(settings, &vault)?));
            run_pipeline(pipeline, cli.monitor).await
        }
        StocksCommand::Ratios => {
            let vault = load_vault(cli)?;
            let pipeline = ValuationPipeline::new(
                store,
                LocalStorage::new(settings.paths.report_dir.clone()),
                finnhub(settings, &vault)?,
                Duration::from_millis(settings.jobs.request_delay_ms),
            );
            run_pipeline(pipeline, cli.monitor).await
        }
        StocksCommand::News { dry_run } => {
            let vault = load_vault(cli)?;
            let pipeline = StockNewsPipeline::new(
                store,
                LocalStorage::new(settings.paths.report_dir.clone()),
                &settings.stocks.summary_file,
                finnhub(settings, &vault)?,
                Mailer::from_vault(&vault, settings.email.tls, *dry_run)?,
                settings.stocks.news_days,
            );
            run_pipeline(pipeline, cli.monitor).await
        }
    }
}

async fn run(cli: &Cli, settings: &Settings) -> Result<String> {
    let data_storage = || LocalStorage::new(settings.paths.data_dir.clone());

    match &cli.command {
        Command::DomainIds => {
            let vault = load_vault(cli)?;
            let digicert = pipelines::digicert_client(settings, &vault)?.map(|(client, _)| client);
            let sectigo = pipelines::sectigo_client(settings, &vault)?.map(|(client, _)| client);
            let pipeline = DomainLookupPipeline::new(data_storage(), digicert, sectigo);
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::CaDetails { ca } => {
            let vault = load_vault(cli)?;
            run_pipeline(ca_details_pipeline(settings, &vault, *ca)?, cli.monitor).await
        }
        Command::Combine => {
            let vault = load_vault(cli)
                .map_err(|e| tracing::debug!("No vault for combine: {}", e))
                .ok();
            run_pipeline(combine_pipeline(settings, vault.as_ref())?, cli.monitor).await
        }
        Command::CaData => {
            let vault = load_vault(cli)?;
            CaDataJob::new(
                data_storage(),
                ca_details_pipeline(settings, &vault, CaKind::DigiCert)?,
                ca_details_pipeline(settings, &vault, CaKind::Sectigo)?,
                combine_pipeline(settings, Some(&vault))?,
                cli.monitor,
            )
            .run()
            .await
        }
        Command::Gaps { input } => {
            let input = input
                .clone()
                .unwrap_or_else(|| settings.data_path(pipelines::DOMAIN_ID_LOOKUP_CSV).into());
            run_pipeline(GapsPipeline::new(data_storage(), input), cli.monitor).await
        }
        Command::Add { domain } | Command::Remove { domain } => {
            let action = match &cli.command {
                Command::Add { .. } => domain_admin::AdminAction::Add,
                _ => domain_admin::AdminAction::Remove,
            };
            let vault = load_vault(cli)?;
            let audit = AuditLog::create(Path::new(&settings.paths.log_dir).join(domain_admin::AUDIT_LOG_FILE))?;
            let pipeline = domain_admin::DomainAdminPipeline::new(
                data_storage(),
                action,
                domain,
                pipelines::digicert_client(settings, &vault)?,
                pipelines::sectigo_client(settings, &vault)?,
                audit,
            )?;
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::DcAdd { domain, file, output } => {
            let domains = pipelines::read_domain_list(domain.as_deref(), file.as_deref())?;
            let vault = load_vault(cli)?;
            let creds = vault.digicert()?;
            let org_id = creds
                .org_id
                .clone()
                .ok_or_else(|| EtlError::missing_credential("digicert", "customerID"))?;
            let client = DigiCertClient::new(&settings.endpoints.digicert, &creds.api_key)?;
            let pipeline = DcAddPipeline::new(data_storage(), client, &org_id, domains, output.clone());
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::Validate {
            domain,
            file,
            org_id,
            output,
        } => {
            let domains = pipelines::read_domain_list(domain.as_deref(), file.as_deref())?;
            let vault = load_vault(cli)?;
            let creds = vault.digicert()?;
            let org_id = org_id
                .clone()
                .or(creds.org_id.clone())
                .ok_or_else(|| EtlError::missing_credential("digicert", "customerID"))?;
            let (storage, report_file) = pipelines::output_target(
                output.as_deref(),
                &settings.paths.report_dir,
                domain_validator::DEFAULT_REPORT_FILE,
            );
            let dns = resolver_for(vault.dns_resolver().as_deref(), &settings.endpoints.dns_over_https)?;
            let pipeline = domain_validator::DomainValidatorPipeline::new(
                storage,
                report_file,
                DigiCertClient::new(&settings.endpoints.digicert, &creds.api_key)?,
                dns,
                &org_id,
                domains,
            );
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::StgDcv { domain, file, output } => {
            let domains = optional_domain_list(domain.as_deref(), file.as_deref())?;
            let vault = load_vault(cli)?;
            let client = SectigoClient::new(&settings.endpoints.sectigo, &vault.sectigo()?)?
                .with_dcv_url(&settings.endpoints.sectigo_dcv);
            let default_file = pipelines::sectigo_dcv::report_file(&pipelines::file_timestamp());
            let (storage, report_file) =
                pipelines::output_target(output.as_deref(), &settings.paths.report_dir, &default_file);
            let pipeline = SectigoDcvPipeline::new(
                storage,
                client,
                domains,
                Duration::from_millis(settings.jobs.request_delay_ms),
            )
            .with_output_file(report_file);
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::StgAddAll { domain, file } => {
            let domains = pipelines::read_domain_list(domain.as_deref(), file.as_deref())?;
            let vault = load_vault(cli)?;
            let creds = vault.sectigo()?;
            let org_id = creds
                .org_id
                .clone()
                .ok_or_else(|| EtlError::missing_credential("Sectigo", "orgID"))?;
            let client = SectigoClient::new(&settings.endpoints.sectigo, &creds)?
                .with_dcv_url(&settings.endpoints.sectigo_dcv);
            let pipeline = SectigoAddAllPipeline::new(data_storage(), client, &org_id, domains);
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::DcvTokens { domain, file, publish } => {
            let vault = load_vault(cli)?;
            let digicert = pipelines::digicert_client(settings, &vault)?.map(|(client, _)| client);
            let sectigo = pipelines::sectigo_client(settings, &vault)?.map(|(client, _)| client);
            let mut pipeline = DcvTokensPipeline::new(data_storage(), digicert, sectigo);
            if let Some(domains) = optional_domain_list(domain.as_deref(), file.as_deref())? {
                pipeline = pipeline.with_domains(domains);
            }
            if *publish {
                let (client, subscription_id) = azure_client(settings, &vault).await?;
                let publisher = AzureCnamePublisher::discover(client, subscription_id).await?;
                pipeline = pipeline.with_publisher(Arc::new(publisher));
            }
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::HostsCheck { hosts, suffixes, output } => {
            let suffixes = match suffixes {
                Some(path) => hosts_check::parse_suffixes(&std::fs::read_to_string(path)?),
                None => Vec::new(),
            };
            // hosts 檢查不一定需要 vault
            let resolver = load_vault(cli).ok().and_then(|vault| vault.dns_resolver());
            let dns = resolver_for(resolver.as_deref(), &settings.endpoints.dns_over_https)?;
            let default_file = hosts_check::report_file(&pipelines::file_timestamp());
            let (storage, report_file) =
                pipelines::output_target(output.as_deref(), &settings.paths.report_dir, &default_file);
            let pipeline = hosts_check::HostsCheckPipeline::new(
                storage,
                Some(report_file),
                hosts.clone(),
                suffixes,
                dns,
                settings.jobs.concurrency,
            );
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::AzureDns { output } => {
            let vault = load_vault(cli)?;
            let (client, subscription_id) = azure_client(settings, &vault).await?;
            let (storage, report_file) = pipelines::output_target(
                output.as_deref(),
                &settings.paths.report_dir,
                azure_dns_report::DEFAULT_REPORT_FILE,
            );
            let pipeline =
                azure_dns_report::AzureDnsReportPipeline::new(storage, report_file, client, subscription_id);
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::Stocks { command } => run_stocks(cli, settings, command).await,
        Command::FuturesEmail { dry_run } => {
            let vault = load_vault(cli)?;
            let quotes = TwelveDataClient::new(&settings.endpoints.twelvedata, &vault.twelvedata_key()?)?;
            let mailer = Mailer::from_vault(&vault, settings.email.tls, *dry_run)?;
            let pipeline = FuturesEmailPipeline::new(settings.stocks.futures.clone(), Arc::new(quotes), mailer);
            run_pipeline(pipeline, cli.monitor).await
        }
        Command::Ocr {
            input,
            output,
            lang,
            dpi,
            jobs,
        } => {
            let tools = OcrTools::new(&settings.ocr.ghostscript, &settings.ocr.tesseract);
            let pipeline = OcrBatchPipeline::new(
                LocalStorage::new(output.display().to_string()),
                input.clone(),
                tools,
                lang.as_deref().unwrap_or(&settings.ocr.lang),
                dpi.unwrap_or(settings.ocr.dpi),
                jobs.unwrap_or(settings.jobs.concurrency),
            );
            run_pipeline(pipeline, cli.monitor).await
        }
    }
}

/// 記錄錯誤並回傳對應的退出碼
fn report_failure(e: &EtlError) -> i32 {
    tracing::error!(
        "❌ Job failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    e.exit_code()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在時忽略
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    let job = cli.command.job_name();
    let log_file = (cli.log_file || settings.logging.file_logging)
        .then(|| logger::log_file_path(&settings.paths.log_dir, job));
    logger::init_cli_logger(cli.verbose, log_file.as_deref()).context("failed to initialise logging")?;

    match logger::prune_old_logs(Path::new(&settings.paths.log_dir), job, settings.logging.retention_days) {
        Ok(0) => {}
        Ok(n) => tracing::debug!("Pruned {} old {} log files", n, job),
        Err(e) => tracing::warn!("⚠️ Could not prune old logs: {}", e),
    }

    tracing::info!("Starting ops-etl {}", job);
    if cli.verbose {
        tracing::debug!("CLI: {:?}", cli);
    }

    // 驗證配置
    if let Err(e) = cli.validate().and_then(|_| settings.validate()) {
        tracing::error!("❌ Configuration validation failed: {}", e);
        report_failure(&e);
        std::process::exit(1);
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    match run(&cli, &settings).await {
        Ok(location) => {
            tracing::info!("✅ {} completed", job);
            println!("✅ {} completed: {}", job, location);
        }
        Err(e) => {
            let exit_code = report_failure(&e);
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
