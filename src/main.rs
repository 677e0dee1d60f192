use anyhow::Result;
use cdp_form_shot::{Browser, ControlLocator, Tab};
use log::warn;
use std::path::Path;

const BASE_URL: &str = "http://localhost:3004/";
const SHOT_DIR: &str = "screenshots";

#[tokio::main]
async fn main() -> Result<()> {
    let browser = Browser::new().await?;

    // Tear the browser down whether the walkthrough succeeded or not; a
    // walkthrough error takes precedence over a close error.
    let outcome = verify_union_forms(&browser).await;
    let closed = browser.close();

    outcome.and(closed)
}

/// Walks the three demo forms through one state change each, capturing a
/// full-page screenshot after every step. The tab is closed whichever way
/// the walkthrough went.
async fn verify_union_forms(browser: &Browser) -> Result<()> {
    let tab = browser.new_tab().await?;
    let walked = walk_demo_states(&tab).await;
    fold_close(walked, tab.close().await)
}

async fn walk_demo_states(tab: &Tab) -> Result<()> {
    tab.goto(BASE_URL).await?;
    println!("Loaded {BASE_URL} ({})", tab.title().await?);
    capture(tab, "01_initial.png").await?;

    // The page reuses name="type" further down, so pin the first match.
    tab.find_control(ControlLocator::named("type").first())
        .await?
        .select_value("dog")
        .await?;
    capture(tab, "02_auto_form_dog.png").await?;

    tab.find_control(ControlLocator::labelled("kind"))
        .await?
        .select_value("b")
        .await?;
    capture(tab, "03_field_example_b.png").await?;

    // The bottom form's accessible label collides with the top form's name.
    tab.find_control(ControlLocator::labelled("type").last())
        .await?
        .select_value("member")
        .await?;
    capture(tab, "04_select_example_member.png").await?;

    Ok(())
}

async fn capture(tab: &Tab, name: &str) -> Result<()> {
    let path = Path::new(SHOT_DIR).join(name);
    tab.screenshot_to(&path).await?;
    println!("Captured {}", path.display());
    Ok(())
}

/// A close error surfaces on its own, but never hides the step that actually
/// broke; the browser teardown reaps a stuck tab anyway.
fn fold_close(walked: Result<()>, closed: Result<()>) -> Result<()> {
    match (walked, closed) {
        (Ok(()), closed) => closed,
        (walked, Ok(())) => walked,
        (Err(step), Err(close)) => {
            warn!("Failed to close tab after failed run: {close:?}");
            Err(step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn clean_runs_stay_clean() {
        assert!(fold_close(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn a_clean_run_still_fails_when_the_tab_close_does() {
        let res = fold_close(Ok(()), Err(anyhow!("tab is gone")));
        assert_eq!(res.unwrap_err().to_string(), "tab is gone");
    }

    #[test]
    fn the_failed_step_outranks_a_close_error() {
        let res = fold_close(Err(anyhow!("no such option")), Err(anyhow!("tab is gone")));
        assert_eq!(res.unwrap_err().to_string(), "no such option");
    }
}
