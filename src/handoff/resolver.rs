//! # 附件识别模块
//!
//! 纯判定逻辑：不做 I/O，不加载内容，只看类型标签。
//! 生产者用它决定是否进入交接流程（以及系统是否允许“发送”）。

use super::source::{Attachment, ShareRequest};

/// 请求中是否存在至少一个图片类附件。
///
/// 遇到第一个匹配即返回；空请求或标签异常的请求返回 `false`，不报错。
pub fn has_qualifying_content(request: &ShareRequest) -> bool {
    request
        .items()
        .iter()
        .any(|item| item.attachments.iter().any(|a| a.type_tag().is_image()))
}

/// 按请求顺序列出全部图片类附件。
pub fn qualifying_attachments(request: &ShareRequest) -> Vec<&Attachment> {
    request
        .attachments()
        .filter(|attachment| attachment.type_tag().is_image())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::source::{ShareItem, TypeTag};
    use crate::handoff::test_support::NeverCalledProvider;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn attachment(tag: &str) -> Attachment {
        Attachment::new(TypeTag::new(tag), Arc::new(NeverCalledProvider))
    }

    #[test]
    fn empty_request_has_no_content() {
        assert!(!has_qualifying_content(&ShareRequest::default()));
        assert!(!has_qualifying_content(&ShareRequest::new(vec![ShareItem::default()])));
    }

    #[test]
    fn finds_image_in_later_item() {
        let request = ShareRequest::new(vec![
            ShareItem::new(vec![attachment("public.url"), attachment("text/plain")]),
            ShareItem::new(vec![attachment("public.jpeg")]),
        ]);

        assert!(has_qualifying_content(&request));
        let found = qualifying_attachments(&request);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].type_tag().as_str(), "public.jpeg");
    }

    #[test]
    fn qualifying_attachments_keep_request_order() {
        let request = ShareRequest::new(vec![
            ShareItem::new(vec![attachment("image/png"), attachment("text/plain")]),
            ShareItem::new(vec![attachment("image/jpeg")]),
        ]);

        let tags: Vec<_> = qualifying_attachments(&request)
            .into_iter()
            .map(|a| a.type_tag().as_str().to_string())
            .collect();
        assert_eq!(tags, vec!["image/png", "image/jpeg"]);
    }

    proptest! {
        #[test]
        fn non_image_tags_never_qualify(
            tags in proptest::collection::vec(
                proptest::collection::vec("(text|application|video|audio)/[a-z]{1,8}", 0..4),
                0..4,
            )
        ) {
            let request = ShareRequest::new(
                tags.iter()
                    .map(|item| ShareItem::new(item.iter().map(|t| attachment(t)).collect()))
                    .collect(),
            );
            prop_assert!(!has_qualifying_content(&request));
            prop_assert!(qualifying_attachments(&request).is_empty());
        }
    }
}
