use localaudit_contracts::BusinessProfile;

// Optional fields render as an explicit placeholder; the oracle always
// receives the complete slot list.
const NOT_PROVIDED: &str = "Not provided";

pub fn build_report_prompt(profile: &BusinessProfile) -> String {
    format!(
        r#"You are a local SEO consultant preparing a short audit for a small business owner.

Business facts:
- Business name: {business_name}
- Business category: {business_type}
- Location: {location}
- Primary service: {primary_service}
- Website URL: {website_url}
- Google Business Profile URL: {gmb_url}
- Ideal customer: {ideal_customer}
- Main goal: {main_goal}
- Street address: {street_address}
- Contact email: {email}

Produce an audit as a JSON object with exactly this structure:

{{
  "overallScore": 72,
  "scoreExplanation": "One or two sentences explaining the score.",
  "profileRecommendations": [
    {{"title": "Short imperative label", "action": "Concrete step the owner should take."}}
  ],
  "websiteRecommendations": [
    {{"title": "Short imperative label", "action": "Concrete step the owner should take."}}
  ]
}}

"overallScore" is an integer from 0 to 100. "scoreExplanation" is a string.
Each recommendations array holds two to four items; every item needs both a
"title" and an "action" string. Base every recommendation on the business
facts above.

Respond with ONLY the JSON object. No introduction, no commentary, no
markdown code fences."#,
        business_name = profile.business_name.trim(),
        business_type = profile.business_type.trim(),
        location = profile.location.trim(),
        primary_service = profile.primary_service.trim(),
        website_url = slot(profile.website_url.as_deref()),
        gmb_url = slot(profile.gmb_url.as_deref()),
        ideal_customer = slot(profile.ideal_customer.as_deref()),
        main_goal = slot(profile.main_goal.as_deref()),
        street_address = slot(profile.street_address.as_deref()),
        email = slot(profile.email.as_deref()),
    )
}

fn slot(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => NOT_PROVIDED,
    }
}
