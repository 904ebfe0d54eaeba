//! 알림 데이터 정제
//!
//! 알림 데이터는 대시보드에 그대로 표시되므로 저장 전에 정제합니다.
//! 1. 길이 제한 (문자 단위, 초과 시 `...` 표시)
//! 2. 제어 문자를 공백으로 치환
//! 3. 마크업 문자(`< > & " '`)를 HTML 엔티티로 이스케이프

/// 잘린 문자열 뒤에 붙는 표시
const ELLIPSIS: &str = "...";

/// 문자열을 정제합니다.
///
/// 엔티티가 중간에서 잘리지 않도록 자르기를 이스케이프보다 먼저 수행합니다.
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars * 2));
    let mut chars = text.chars();
    for ch in chars.by_ref().take(max_chars) {
        push_escaped(&mut out, ch);
    }
    if chars.next().is_some() {
        out.push_str(ELLIPSIS);
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '&' => out.push_str("&amp;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        c if c.is_control() => out.push(' '),
        c => out.push(c),
    }
}
