//! 静态模型价格表，单位为“分/百万 token”。
//! 成本一律由本表推导，绝不采信上游返回的计费字段。

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPrice {
    pub input_per_million: i64,
    pub output_per_million: i64,
}

const fn price(input_per_million: i64, output_per_million: i64) -> ModelPrice {
    ModelPrice {
        input_per_million,
        output_per_million,
    }
}

/// 未收录模型的兜底价格
pub const DEFAULT_PRICE: ModelPrice = price(100, 300);

static PRICING: &[(&str, ModelPrice)] = &[
    // Anthropic
    ("claude-3-5-haiku-20241022", price(25, 125)),
    ("claude-3-5-sonnet-20241022", price(300, 1500)),
    ("claude-sonnet-4-20250514", price(300, 1500)),
    ("claude-opus-4-20250514", price(1500, 7500)),
    // OpenAI
    ("gpt-4o", price(250, 1000)),
    ("gpt-4o-mini", price(15, 60)),
    ("gpt-4.1", price(200, 800)),
    ("gpt-4.1-mini", price(40, 160)),
    // 智谱
    ("glm-4-plus", price(70, 70)),
    ("glm-4-air", price(14, 14)),
    ("glm-4-flash", price(1, 1)),
    // 通义千问
    ("qwen-max", price(34, 137)),
    ("qwen-plus", price(11, 28)),
    ("qwen-turbo", price(4, 8)),
    // 本地 Ollama 不产生费用
    ("llama3.1", price(0, 0)),
    ("qwen2.5", price(0, 0)),
];

pub fn price_for(model: &str) -> ModelPrice {
    PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_PRICE)
}

/// round(prompt·priceIn/1e6 + completion·priceOut/1e6)，结果为整数分
pub fn calculate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> i64 {
    let p = price_for(model);
    let cost = prompt_tokens as f64 * p.input_per_million as f64 / 1_000_000.0
        + completion_tokens as f64 * p.output_per_million as f64 / 1_000_000.0;
    cost.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haiku_million_prompt_tokens_costs_25_cents() {
        assert_eq!(calculate_cost("claude-3-5-haiku-20241022", 1_000_000, 0), 25);
    }

    #[test]
    fn output_tokens_use_output_price() {
        assert_eq!(calculate_cost("claude-3-5-haiku-20241022", 0, 1_000_000), 125);
        assert_eq!(calculate_cost("gpt-4o", 1_000_000, 1_000_000), 1250);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        assert_eq!(calculate_cost("mystery-model", 1_000_000, 0), 100);
        assert_eq!(price_for("mystery-model"), DEFAULT_PRICE);
    }

    #[test]
    fn small_usage_rounds_to_nearest_cent() {
        // 10k prompt tokens * 25/1e6 = 0.25 分 -> 0
        assert_eq!(calculate_cost("claude-3-5-haiku-20241022", 10_000, 0), 0);
        // 30k prompt tokens = 0.75 分 -> 1
        assert_eq!(calculate_cost("claude-3-5-haiku-20241022", 30_000, 0), 1);
    }

    #[test]
    fn local_models_are_free() {
        assert_eq!(calculate_cost("llama3.1", 500_000, 500_000), 0);
    }
}
