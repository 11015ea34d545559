use super::providers::VariantDetector;

// Characters that only occur in one of the two variants. Forms shared by
// both (里, 后, 云, 与, ...) are not listed.
const TRADITIONAL_ONLY: &str = "這們個來時會說愛國過還對開聽讓見風夢長當樣為從裡後麼無沒請現學東車門問間點頭實發經體電話語歡聲氣號傳關義處應變邊歲灣記書寫買賣讀樂飛鳥馬魚龍紅綠藍線網結給難離雲淚戀憶溫臉隨靜願萬單雙輕覺親擁遠運陽陰顏題類燈淺漸斷憐懷聞舊嗎謝認識錯鐘夠總終";
const SIMPLIFIED_ONLY: &str = "这们个来时会说爱国过还对开听让见风梦长当样为从无没请现学东车门问间点头实发经体电话语欢声气号传关义处应变边岁湾记书写买卖读乐飞鸟马鱼龙红绿蓝线网结给难离泪恋忆温脸随静愿万单双轻觉亲拥远运阳阴颜题类灯浅渐断怜怀闻旧吗谢认识错钟够总终";

/// Counts characters that are unique to either variant and picks the side
/// with more hits. Ties and lines without evidence count as simplified.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTableDetector;

impl VariantDetector for CharTableDetector {
    fn is_traditional(&self, han: &str) -> bool {
        let (traditional, simplified) = han.chars().fold((0usize, 0usize), |(t, s), ch| {
            if TRADITIONAL_ONLY.contains(ch) {
                (t + 1, s)
            } else if SIMPLIFIED_ONLY.contains(ch) {
                (t, s + 1)
            } else {
                (t, s)
            }
        });
        traditional > simplified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_do_not_overlap() {
        for ch in TRADITIONAL_ONLY.chars() {
            assert!(!SIMPLIFIED_ONLY.contains(ch), "{ch} is in both tables");
        }
    }

    #[test]
    fn test_detects_variant_by_majority() {
        assert!(CharTableDetector.is_traditional("這是我們的歌"));
        assert!(!CharTableDetector.is_traditional("这是我们的歌"));
        // no distinguishing characters
        assert!(!CharTableDetector.is_traditional("你好"));
        assert!(!CharTableDetector.is_traditional(""));
    }
}
