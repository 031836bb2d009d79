//! 服务句柄：一次构造，按引用传入每个节点
//!
//! 生成、语义存储、搜索、沙箱、包仓库全部通过 trait 对象注入，测试可整体替换为替身。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::ForgeError;
use crate::llm::{create_embedder_from_config, create_llm_from_config, LlmClient};
use crate::memory::{BackgroundIndexer, CodeMemory, InMemorySemanticStore, SemanticStore};
use crate::pipeline::registries::{NpmRegistry, PackageRegistry, PyPiRegistry};
use crate::research::{ResearchProvider, TavilySearch, WebSearch};
use crate::sandbox::{LocalSandboxProvider, SandboxProvider, SandboxRegistry};

pub struct Services {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub research: ResearchProvider,
    pub indexer: BackgroundIndexer,
    pub sandbox: Arc<dyn SandboxProvider>,
    pub sandbox_registry: SandboxRegistry,
    pub pypi: Arc<dyn PackageRegistry>,
    pub npm: Arc<dyn PackageRegistry>,
}

impl Services {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn SemanticStore>,
        web: Option<Arc<dyn WebSearch>>,
        sandbox: Arc<dyn SandboxProvider>,
        pypi: Arc<dyn PackageRegistry>,
        npm: Arc<dyn PackageRegistry>,
    ) -> Self {
        let research = ResearchProvider::new(web, Arc::clone(&store), &config.research);
        let memory = Arc::new(CodeMemory::new(store, &config.memory));
        let indexer = BackgroundIndexer::new(memory, config.memory.indexing_workers);
        let sandbox_registry = SandboxRegistry::new(&config.sandbox.registry_path);
        Self {
            config,
            llm,
            research,
            indexer,
            sandbox,
            sandbox_registry,
            pypi,
            npm,
        }
    }

    /// 按配置构造生产环境的服务集合
    pub fn from_config(config: AppConfig) -> Result<Self, ForgeError> {
        let llm = create_llm_from_config(&config)?;

        let store: Arc<dyn SemanticStore> = match create_embedder_from_config(&config.llm) {
            Some(embedder) => {
                tracing::info!("semantic memory: embedding mode");
                Arc::new(InMemorySemanticStore::with_embedder(embedder, config.memory.min_similarity))
            }
            None => {
                tracing::info!("semantic memory: keyword mode");
                Arc::new(InMemorySemanticStore::new())
            }
        };

        let web: Arc<dyn WebSearch> = Arc::new(TavilySearch::from_config(&config.research));
        let sandbox = Arc::new(LocalSandboxProvider::new(&config.sandbox.root));
        let pypi = Arc::new(PyPiRegistry::from_config(&config.registries));
        let npm = Arc::new(NpmRegistry::from_config(&config.registries));

        Ok(Self::new(config, llm, store, Some(web), sandbox, pypi, npm))
    }
}
