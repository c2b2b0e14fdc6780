//! Fixed technique-analysis prompt sent with every request

pub const ACTION_PROMPT: &str = r#"
### 基本分析
1. **动作识别**
    - "请识别图片中游泳者的泳姿类型（如自由泳、蛙泳等），并描述其基本动作。"
    - "游泳者的身体位置和姿态是什么？请描述其在水中的相对位置。"

2. **动作分解**
- "请详细描述图片中游泳者的头、手臂和腿部位置，并比较与标准泳姿的区别，指出可能存在的技术问题？"
- "这张图片中，游泳者的头部、手臂和腿部姿势是否正确？请分析并解释可能的技术误区。"

### 进阶分析
3. **技术建议**
- "基于此帧的分析，请提供改进游泳者技术的具体建议，特别是关于手臂划水和腿部蹬水的部分。"
- "请识别出游泳者可改进的技术细节，并建议合适的训练手段来加强这些方面。"

4. **动态分析**
- "设想游泳者从这帧开始的动作过渡，请提供可能的后续建议来优化整个游泳动作流畅性。"
- "在这张图片中，如何通过微调姿态改善整体动力？例如，是否需要调整入水角度或者蹬腿节奏？"

5. **互动建议**
- "如果你有任何想法或建议来即刻改善这个姿势，从而提升游泳技术动作，请描述详情。"
- "如果现有的体位调整能改善这帧中的姿态，请描述具体如何执行这类调整。"
"#;
