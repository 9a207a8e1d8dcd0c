use pdf_quiz_pipeline::browser::connect_to_browser_and_page;
use pdf_quiz_pipeline::clients::{CompletionService, OpenAiCompletion};
use pdf_quiz_pipeline::config::Config;
use pdf_quiz_pipeline::infrastructure::{ChromiumPage, JsExecutor};
use pdf_quiz_pipeline::models::OcrSelectors;
use pdf_quiz_pipeline::services::scan_folders;
use std::time::Duration;

fn load_config() -> Config {
    dotenv::dotenv().ok();
    Config::from_env().expect("加载配置失败")
}

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_browser_connection() {
    let config = load_config();
    let port = config.browser_debug_port.expect("需要设置 BROWSER_DEBUG_PORT");

    let result = connect_to_browser_and_page(port, &config.ocr_target_url).await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_ocr_page_ready() {
    let config = load_config();
    let port = config.browser_debug_port.expect("需要设置 BROWSER_DEBUG_PORT");
    let selectors = OcrSelectors::default();

    let (_browser, page) = connect_to_browser_and_page(port, &config.ocr_target_url)
        .await
        .expect("连接浏览器失败");
    let page = ChromiumPage::new(JsExecutor::new(page));

    page.wait_until_ready(
        &selectors.parse_button,
        &selectors.file_input,
        Duration::from_secs(60),
    )
    .await
    .expect("OCR 页面未就绪");
}

#[tokio::test]
#[ignore]
async fn test_llm_completion() {
    let config = load_config();
    let service = OpenAiCompletion::new(&config);

    let response = service
        .complete("Trả lời ngắn gọn: 1 + 1 bằng mấy?")
        .await
        .expect("LLM 调用失败");

    let text = response.into_text();
    println!("LLM 响应: {}", text);
    assert!(!text.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_scan_configured_folders() {
    let config = load_config();

    let batches = scan_folders(&config.data_dir, &config.loading_folders)
        .await
        .expect("扫描目录失败");

    let total: usize = batches.iter().map(|b| b.documents.len()).sum();
    println!("找到 {} 个 PDF", total);
}
